//! Application payloads exchanged over the relay session.
//!
//! These are the `params` of the relay's `message` method: a tagged union
//! of request-for-quote broadcasts, agent quotes, and winner notices. All
//! amounts travel as decimal-string-encoded integers.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::auction::Quote;
use crate::serde_helpers::u256_decimal;

/// Request-for-quote broadcast opening an auction window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RfqPayload {
	pub intent_id: u64,
	#[serde(with = "u256_decimal")]
	pub amount_in: U256,
	#[serde(with = "u256_decimal")]
	pub min_output_amount: U256,
	pub zero_for_one: bool,
	pub currency0: Address,
	pub currency1: Address,
	/// Decimal scale of currency0, so agents can normalize across pairs.
	pub currency0_decimals: u8,
	/// Decimal scale of currency1.
	pub currency1_decimals: u8,
	/// Block-height deadline of the underlying intent.
	pub deadline: u64,
}

/// A competitive quote submitted by an agent in response to an RFQ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotePayload {
	pub intent_id: u64,
	pub agent_address: Address,
	pub agent_name: String,
	#[serde(with = "u256_decimal")]
	pub output_amount: U256,
	/// Agent-side submission timestamp in milliseconds.
	pub timestamp: u64,
}

impl From<QuotePayload> for Quote {
	fn from(payload: QuotePayload) -> Self {
		Quote {
			agent: payload.agent_address,
			agent_name: payload.agent_name,
			output_amount: payload.output_amount,
			timestamp: payload.timestamp,
		}
	}
}

/// Winner notice broadcast after an auction closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerPayload {
	pub intent_id: u64,
	pub winner_address: Address,
	#[serde(with = "u256_decimal")]
	pub output_amount: U256,
}

/// The tagged union carried by the relay's `message` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
	Rfq(RfqPayload),
	Quote(QuotePayload),
	Winner(WinnerPayload),
}
