//! Ledger collaborator for the aggregator.
//!
//! Wraps a JSON-RPC provider behind the small set of primitives the
//! aggregator consumes: current height, intent-creation event queries,
//! contract state reads, and signed transaction submission. The trait
//! seams exist so the scanner, auction manager, and reputation service
//! can be exercised against in-memory ledgers in tests.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use thiserror::Error;

use aggregator_types::Intent;

mod client;
mod intent_book;

pub use client::LedgerClient;
pub use intent_book::IntentBook;

#[derive(Debug, Error)]
pub enum LedgerError {
	#[error("RPC error: {0}")]
	Rpc(String),
	#[error("Decode error: {0}")]
	Decode(String),
	#[error("Signing error: {0}")]
	Signing(String),
	#[error("Transaction {0} reverted")]
	TransactionReverted(B256),
}

/// An intent-creation event as it appears in the ledger's log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentCreation {
	pub intent_id: u64,
	pub requester: Address,
}

/// Read access to the intent book contract.
#[async_trait]
pub trait IntentLedger: Send + Sync {
	/// Current block height of the ledger.
	async fn current_height(&self) -> Result<u64, LedgerError>;
	/// Intent-creation events in the inclusive height range.
	async fn intent_created(
		&self,
		from_height: u64,
		to_height: u64,
	) -> Result<Vec<IntentCreation>, LedgerError>;
	/// Fetches the full intent record by id.
	async fn fetch_intent(&self, intent_id: u64) -> Result<Intent, LedgerError>;
}

/// Token metadata lookups needed to normalize quotes across pairs.
#[async_trait]
pub trait TokenMetadata: Send + Sync {
	async fn token_decimals(&self, token: Address) -> Result<u8, LedgerError>;
}

/// Raw contract access used by the reputation path.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
	/// Executes a read-only contract call and returns the raw result.
	async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, LedgerError>;
	/// Signs and submits a contract call, awaiting its inclusion receipt.
	async fn submit_call(&self, to: Address, calldata: Bytes) -> Result<B256, LedgerError>;
}
