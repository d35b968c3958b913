//! In-memory auction state.
//!
//! Auctions exist only for the duration of their quote window and are
//! never persisted. The active set is held in a concurrent map; the
//! auction manager is the only component that mutates it, other
//! components get a read-only view for duplicate suppression.

use alloy_primitives::{Address, U256};
use dashmap::DashMap;

use crate::intent::Intent;

/// A quote received from an agent during an open auction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
	/// Ledger address of the quoting agent.
	pub agent: Address,
	/// Display name the agent announced itself with.
	pub agent_name: String,
	/// Output amount the agent commits to deliver.
	pub output_amount: U256,
	/// Submission timestamp in milliseconds.
	pub timestamp: u64,
}

/// Per-intent auction state, keyed by intent id in the active set.
#[derive(Debug, Clone)]
pub struct Auction {
	/// Immutable intent snapshot taken at open time.
	pub intent: Intent,
	/// Quotes in arrival order.
	pub quotes: Vec<Quote>,
	/// Millisecond timestamp of the auction open.
	pub started_at: u64,
}

impl Auction {
	pub fn new(intent: Intent, started_at: u64) -> Self {
		Self {
			intent,
			quotes: Vec::new(),
			started_at,
		}
	}
}

/// The set of currently open auctions.
///
/// Backed by a sharded concurrent map so the scanner can check membership
/// without coordinating with the auction manager's mutations.
#[derive(Debug, Default)]
pub struct ActiveAuctions {
	inner: DashMap<u64, Auction>,
}

impl ActiveAuctions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Whether an auction is currently open for the given intent id.
	pub fn contains(&self, intent_id: u64) -> bool {
		self.inner.contains_key(&intent_id)
	}

	/// Inserts an auction unless one is already open for the id.
	///
	/// Returns false (and leaves the existing auction untouched) when the
	/// id is already present.
	pub fn insert_if_absent(&self, intent_id: u64, auction: Auction) -> bool {
		match self.inner.entry(intent_id) {
			dashmap::mapref::entry::Entry::Occupied(_) => false,
			dashmap::mapref::entry::Entry::Vacant(slot) => {
				slot.insert(auction);
				true
			}
		}
	}

	/// Runs `f` against the open auction for `intent_id`, if any.
	pub fn update<R>(&self, intent_id: u64, f: impl FnOnce(&mut Auction) -> R) -> Option<R> {
		self.inner
			.get_mut(&intent_id)
			.map(|mut entry| f(entry.value_mut()))
	}

	/// Removes and returns the auction for `intent_id`, if still open.
	pub fn remove(&self, intent_id: u64) -> Option<Auction> {
		self.inner.remove(&intent_id).map(|(_, auction)| auction)
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}
}
