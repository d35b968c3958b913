//! Reputation feedback for auction winners.
//!
//! Converts an auction outcome into a bounded score and submits it to an
//! external registry contract. Submission is fire-and-forget: it runs as
//! an independent task whose success or failure is only logged, so a slow
//! or failing registry never stalls the auction pipeline.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use aggregator_ledger::{LedgerError, LedgerGateway};

mod registry;
mod score;

pub use registry::ReputationSummary;
pub use score::outcome_score;

#[derive(Debug, Error)]
pub enum ReputationError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("Decode error: {0}")]
	Decode(String),
}

/// Sink for auction outcomes.
///
/// `submit` must not block the caller: implementations spawn their own
/// work and report failures through logs only.
pub trait AuctionFeedback: Send + Sync {
	fn submit(&self, winner: Address, winning_output: U256, min_output: U256);
}

/// Feedback sink used when no registry is configured.
#[derive(Debug, Default)]
pub struct NoopFeedback;

impl AuctionFeedback for NoopFeedback {
	fn submit(&self, winner: Address, _winning_output: U256, _min_output: U256) {
		debug!(winner = %winner, "reputation reporting disabled, skipping feedback");
	}
}

/// Submits outcome scores to the on-chain reputation registry.
pub struct ReputationService {
	gateway: Arc<dyn LedgerGateway>,
	registry: Address,
	/// Winner ledger address -> registry identity id.
	identities: HashMap<Address, U256>,
}

impl ReputationService {
	pub fn new(
		gateway: Arc<dyn LedgerGateway>,
		registry: Address,
		identities: HashMap<Address, U256>,
	) -> Self {
		Self {
			gateway,
			registry,
			identities,
		}
	}

	/// Number of known winner -> identity mappings.
	pub fn mapped_agents(&self) -> usize {
		self.identities.len()
	}

	/// Submits a score for a registry identity and awaits inclusion.
	pub async fn submit_score(&self, identity: U256, score: u8) -> Result<(), ReputationError> {
		let calldata = registry::give_feedback_calldata(identity, score);
		let tx_hash = self.gateway.submit_call(self.registry, calldata).await?;
		info!(identity = %identity, score, tx = %tx_hash, "reputation feedback submitted");
		Ok(())
	}

	/// Reads the aggregate feedback summary for a registry identity.
	pub async fn fetch_summary(
		&self,
		identity: U256,
		raters: Vec<Address>,
	) -> Result<ReputationSummary, ReputationError> {
		let calldata = registry::get_summary_calldata(identity, raters);
		let raw = self.gateway.call(self.registry, calldata).await?;
		registry::decode_summary(&raw)
	}
}

impl AuctionFeedback for ReputationService {
	fn submit(&self, winner: Address, winning_output: U256, min_output: U256) {
		let Some(identity) = self.identities.get(&winner).copied() else {
			info!(winner = %winner, "no registry identity mapped, skipping feedback");
			return;
		};

		let score = outcome_score(winning_output, min_output);
		let gateway = Arc::clone(&self.gateway);
		let registry = self.registry;

		// Fire and forget: the auction pipeline never waits on this.
		tokio::spawn(async move {
			let calldata = registry::give_feedback_calldata(identity, score);
			match gateway.submit_call(registry, calldata).await {
				Ok(tx_hash) => {
					info!(winner = %winner, score, tx = %tx_hash, "reputation feedback submitted");
				}
				Err(e) => {
					error!(winner = %winner, score, "reputation feedback failed: {}", e);
				}
			}
		});
	}
}
