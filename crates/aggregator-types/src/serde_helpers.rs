//! Serde helpers shared by the wire payloads.

/// Decimal-string encoding for `U256` amounts.
///
/// The relay payloads carry amounts as decimal strings rather than JSON
/// numbers or hex, so agents in any runtime can parse them without
/// precision loss.
pub mod u256_decimal {
	use alloy_primitives::U256;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		// Display for U256 is the decimal representation.
		serializer.collect_str(value)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		raw.parse::<U256>().map_err(serde::de::Error::custom)
	}
}
