//! Auction orchestration.
//!
//! Owns the per-intent auction lifecycle: the scanner feeds newly
//! discovered pending intents into the engine loop, the auction manager
//! broadcasts RFQs and collects quotes over the relay session, close
//! timers end each auction after the quote window, and winners are handed
//! to the reputation service.

use thiserror::Error;

use aggregator_account::AccountError;
use aggregator_channel::ChannelError;
use aggregator_ledger::LedgerError;

mod auction;
mod engine;

pub use auction::{AuctionManager, QuoteOutcome};
pub use engine::{AggregatorBuilder, AggregatorEngine};

#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Channel error: {0}")]
	Channel(#[from] ChannelError),

	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),

	#[error("Account error: {0}")]
	Account(#[from] AccountError),

	#[error("Configuration error: {0}")]
	Config(String),
}
