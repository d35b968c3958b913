//! Intent discovery for the aggregator.
//!
//! Polls the ledger for intent-creation events and converts them into a
//! stream of "new pending intent" notifications, exactly once per intent.
//! The scanner never mutates auction state; it only reads the active set
//! to avoid re-announcing an intent that is already being auctioned.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use aggregator_ledger::{IntentLedger, LedgerError};
use aggregator_types::{ActiveAuctions, Intent};

#[derive(Debug, Error)]
pub enum ScanError {
	#[error("Ledger error: {0}")]
	Ledger(#[from] LedgerError),
}

/// Scanner settings.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
	/// Poll interval between ticks.
	pub poll_interval: Duration,
	/// How far behind the current height the first tick starts, so a
	/// restart does not replay the whole ledger.
	pub lookback_blocks: u64,
}

impl Default for ScannerConfig {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(2),
			lookback_blocks: 100,
		}
	}
}

/// Polls the ledger and forwards newly created pending intents.
pub struct IntentScanner {
	ledger: Arc<dyn IntentLedger>,
	auctions: Arc<ActiveAuctions>,
	config: ScannerConfig,
	/// Height up to which events have been consumed; None until the first
	/// tick observes the ledger.
	last_scanned: Mutex<Option<u64>>,
}

impl IntentScanner {
	pub fn new(
		ledger: Arc<dyn IntentLedger>,
		auctions: Arc<ActiveAuctions>,
		config: ScannerConfig,
	) -> Self {
		Self {
			ledger,
			auctions,
			config,
			last_scanned: Mutex::new(None),
		}
	}

	/// The scan cursor, for observability and tests.
	pub fn last_scanned_height(&self) -> Option<u64> {
		*self.last_scanned.lock().expect("cursor lock poisoned")
	}

	/// Runs the polling loop until the shutdown signal flips.
	///
	/// One tick is in flight at a time; a failed tick is logged and the
	/// loop continues on the next interval.
	pub async fn run(
		&self,
		sink: mpsc::UnboundedSender<Intent>,
		mut shutdown: watch::Receiver<bool>,
	) {
		info!(
			interval_ms = self.config.poll_interval.as_millis() as u64,
			"scanner started"
		);

		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				_ = ticker.tick() => {
					if let Err(e) = self.tick(&sink).await {
						warn!("scan tick failed: {}", e);
					}
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						info!("scanner stopped");
						break;
					}
				}
			}
		}
	}

	/// One scan pass over the ledger.
	///
	/// The cursor advances to the observed height as soon as the height is
	/// known, before any event processing: a failure inside the window is
	/// logged and the window is skipped for good rather than retried.
	pub async fn tick(&self, sink: &mpsc::UnboundedSender<Intent>) -> Result<(), ScanError> {
		let current = self.ledger.current_height().await?;

		let from = {
			let mut cursor = self.last_scanned.lock().expect("cursor lock poisoned");
			let last = cursor
				.unwrap_or_else(|| current.saturating_sub(self.config.lookback_blocks));

			if current <= last {
				*cursor = Some(last);
				return Ok(());
			}
			*cursor = Some(current);
			last + 1
		};

		let events = self.ledger.intent_created(from, current).await?;
		if !events.is_empty() {
			debug!(
				from,
				to = current,
				count = events.len(),
				"intent creation events"
			);
		}

		for event in events {
			if self.auctions.contains(event.intent_id) {
				continue;
			}

			let intent = match self.ledger.fetch_intent(event.intent_id).await {
				Ok(intent) => intent,
				Err(e) => {
					// Skipped for good; the cursor has already advanced.
					warn!(intent_id = event.intent_id, "intent fetch failed: {}", e);
					continue;
				}
			};

			if !intent.is_pending() {
				debug!(
					intent_id = event.intent_id,
					"skipping non-pending intent"
				);
				continue;
			}

			info!(
				intent_id = event.intent_id,
				amount_in = %intent.amount_in,
				min_output = %intent.min_output_amount,
				"new intent"
			);

			if sink.send(intent).is_err() {
				// Engine is gone; the loop will be shut down shortly.
				return Ok(());
			}
		}

		Ok(())
	}
}
