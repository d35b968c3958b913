//! Swap intent types for the aggregator.
//!
//! This module defines the on-ledger intent record as seen by the
//! aggregator. An intent is fetched once when its creation event is
//! discovered; after its status leaves [`IntentStatus::Pending`] the
//! aggregator treats the record as immutable.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an intent as stored by the intent book contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentStatus {
	/// Awaiting a fill; the only state in which an auction may be opened.
	Pending,
	/// Filled by an agent; `filled_by` and `output_amount` are set.
	Filled,
	/// Cancelled by the requester.
	Cancelled,
	/// Passed its block-height deadline without a fill.
	Expired,
}

impl TryFrom<u8> for IntentStatus {
	type Error = u8;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(IntentStatus::Pending),
			1 => Ok(IntentStatus::Filled),
			2 => Ok(IntentStatus::Cancelled),
			3 => Ok(IntentStatus::Expired),
			other => Err(other),
		}
	}
}

/// An on-ledger swap intent.
///
/// Snapshot of the intent book record at discovery time. All amounts are
/// raw token units; `deadline` is a block height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
	/// Sequence number assigned by the intent book contract.
	pub intent_id: u64,
	/// Address that deposited funds and declared the trade.
	pub requester: Address,
	/// First token of the pair.
	pub currency0: Address,
	/// Second token of the pair.
	pub currency1: Address,
	/// Trade direction: true sells currency0 for currency1.
	pub zero_for_one: bool,
	/// Input amount committed by the requester.
	pub amount_in: U256,
	/// Floor price: quotes below this are rejected.
	pub min_output_amount: U256,
	/// Block height after which the intent expires.
	pub deadline: u64,
	/// Current lifecycle status.
	pub status: IntentStatus,
	/// Filler address, set once filled.
	pub filled_by: Address,
	/// Output delivered by the filler, set once filled.
	pub output_amount: U256,
}

impl Intent {
	/// Whether an auction may still be opened for this intent.
	pub fn is_pending(&self) -> bool {
		self.status == IntentStatus::Pending
	}
}
