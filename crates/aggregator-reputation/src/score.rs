//! Outcome scoring.

use alloy_primitives::U256;

/// Score for a winning quote relative to the intent's floor price.
///
/// The percentage improvement over the minimum acceptable output is added
/// to a base of 50 and clamped into the registry's accepted 1..=100 range.
/// A zero minimum carries no price information, so it maps to the neutral
/// base score.
pub fn outcome_score(winning_output: U256, min_output: U256) -> u8 {
	if min_output.is_zero() {
		return 50;
	}

	let improvement = winning_output.saturating_sub(min_output);
	let improvement_pct = improvement
		.saturating_mul(U256::from(100u64))
		.checked_div(min_output)
		.unwrap_or(U256::ZERO)
		.min(U256::from(100u64))
		.to::<u64>();

	(improvement_pct + 50).clamp(1, 100) as u8
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewards_improvement_over_the_floor() {
		// 10% over the floor: 50 + 10.
		assert_eq!(
			outcome_score(U256::from(1_100u64), U256::from(1_000u64)),
			60
		);
		// Exactly at the floor: base score.
		assert_eq!(
			outcome_score(U256::from(1_000u64), U256::from(1_000u64)),
			50
		);
	}

	#[test]
	fn caps_at_the_registry_maximum() {
		assert_eq!(
			outcome_score(U256::from(10_000u64), U256::from(1_000u64)),
			100
		);
		assert_eq!(outcome_score(U256::MAX, U256::from(1u64)), 100);
	}

	#[test]
	fn zero_minimum_is_neutral() {
		assert_eq!(outcome_score(U256::from(5_000u64), U256::ZERO), 50);
	}

	#[test]
	fn fractional_improvement_rounds_down() {
		// 99 / 1000 = 9.9% -> 9.
		assert_eq!(
			outcome_score(U256::from(1_099u64), U256::from(1_000u64)),
			59
		);
	}
}
