//! Reputation registry contract bindings.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};

use crate::ReputationError;

// Feedback is tagged so unrelated uses of the registry do not pollute the
// auction summaries.
const FEEDBACK_TAG1: &str = "starred";
const FEEDBACK_TAG2: &str = "swap";

sol! {
	interface IReputationRegistry {
		function giveFeedback(
			uint256 agentId,
			int128 value,
			uint8 valueDecimals,
			string tag1,
			string tag2,
			string endpoint,
			string feedbackURI,
			bytes32 feedbackHash
		) external;

		function getSummary(
			uint256 agentId,
			address[] clientAddresses,
			string tag1,
			string tag2
		) external view returns (uint64 count, int128 summaryValue, uint8 summaryValueDecimals);
	}
}

/// Aggregate feedback for one registry identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationSummary {
	pub count: u64,
	pub score: i64,
}

pub(crate) fn give_feedback_calldata(identity: U256, score: u8) -> Bytes {
	IReputationRegistry::giveFeedbackCall {
		agentId: identity,
		value: score as i128,
		valueDecimals: 0,
		tag1: FEEDBACK_TAG1.to_string(),
		tag2: FEEDBACK_TAG2.to_string(),
		endpoint: String::new(),
		feedbackURI: String::new(),
		feedbackHash: B256::ZERO,
	}
	.abi_encode()
	.into()
}

pub(crate) fn get_summary_calldata(identity: U256, raters: Vec<Address>) -> Bytes {
	IReputationRegistry::getSummaryCall {
		agentId: identity,
		clientAddresses: raters,
		tag1: FEEDBACK_TAG1.to_string(),
		tag2: FEEDBACK_TAG2.to_string(),
	}
	.abi_encode()
	.into()
}

pub(crate) fn decode_summary(raw: &[u8]) -> Result<ReputationSummary, ReputationError> {
	let decoded = IReputationRegistry::getSummaryCall::abi_decode_returns(raw, true)
		.map_err(|e| ReputationError::Decode(format!("Bad getSummary return: {}", e)))?;

	Ok(ReputationSummary {
		count: decoded.count,
		score: decoded.summaryValue as i64,
	})
}
