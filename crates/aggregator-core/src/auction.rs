//! Per-intent auction state machine.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aggregator_channel::OutboundSession;
use aggregator_ledger::TokenMetadata;
use aggregator_reputation::AuctionFeedback;
use aggregator_types::{
	now_millis, ActiveAuctions, Auction, Intent, MessagePayload, Quote, QuotePayload, RfqPayload,
	WinnerPayload,
};

use crate::EngineError;

/// What happened to an inbound quote. Quotes are never errors: rejected
/// ones are dropped and logged, nothing propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteOutcome {
	/// Appended; carries the auction's quote count afterwards.
	Accepted(usize),
	/// No open auction for the intent id (closed or never opened).
	UnknownAuction,
	/// Output below the intent's minimum acceptable output.
	BelowMinimum,
}

/// Runs the timed competitive-quote protocol per intent.
///
/// The per-id lifecycle is `none -> open -> closed`: an id enters the
/// active set at most once, and a closed id is simply absent. All calls
/// are funneled through the engine loop, so each mutation of the active
/// set is a single synchronous step.
pub struct AuctionManager {
	auctions: Arc<ActiveAuctions>,
	session: Arc<dyn OutboundSession>,
	tokens: Arc<dyn TokenMetadata>,
	feedback: Arc<dyn AuctionFeedback>,
	quote_window: Duration,
	close_tx: mpsc::UnboundedSender<u64>,
}

impl AuctionManager {
	pub fn new(
		auctions: Arc<ActiveAuctions>,
		session: Arc<dyn OutboundSession>,
		tokens: Arc<dyn TokenMetadata>,
		feedback: Arc<dyn AuctionFeedback>,
		quote_window: Duration,
		close_tx: mpsc::UnboundedSender<u64>,
	) -> Self {
		Self {
			auctions,
			session,
			tokens,
			feedback,
			quote_window,
			close_tx,
		}
	}

	/// Opens an auction and broadcasts its RFQ.
	///
	/// A no-op (returning false) for non-pending intents and for ids that
	/// already have an open auction. On a broadcast or token-lookup
	/// failure the auction is rolled back out of the active set and the
	/// error surfaces to the caller, which logs it.
	pub async fn open_auction(&self, intent: Intent) -> Result<bool, EngineError> {
		if !intent.is_pending() {
			debug!(
				intent_id = intent.intent_id,
				"intent is not pending, not opening an auction"
			);
			return Ok(false);
		}

		let intent_id = intent.intent_id;
		if !self
			.auctions
			.insert_if_absent(intent_id, Auction::new(intent.clone(), now_millis()))
		{
			debug!(intent_id, "auction already open");
			return Ok(false);
		}

		match self.broadcast_rfq(&intent).await {
			Ok(()) => {}
			Err(e) => {
				// Roll back so a later re-discovery could still auction it.
				self.auctions.remove(intent_id);
				return Err(e);
			}
		}

		self.schedule_close(intent_id);
		info!(
			intent_id,
			window_ms = self.quote_window.as_millis() as u64,
			"auction opened"
		);
		Ok(true)
	}

	async fn broadcast_rfq(&self, intent: &Intent) -> Result<(), EngineError> {
		// Agents need both decimal scales to normalize quotes across
		// pairs with different precision.
		let (currency0_decimals, currency1_decimals) = tokio::try_join!(
			self.tokens.token_decimals(intent.currency0),
			self.tokens.token_decimals(intent.currency1),
		)?;

		let rfq = MessagePayload::Rfq(RfqPayload {
			intent_id: intent.intent_id,
			amount_in: intent.amount_in,
			min_output_amount: intent.min_output_amount,
			zero_for_one: intent.zero_for_one,
			currency0: intent.currency0,
			currency1: intent.currency1,
			currency0_decimals,
			currency1_decimals,
			deadline: intent.deadline,
		});

		self.session.broadcast(&rfq).await?;
		debug!(intent_id = intent.intent_id, "RFQ broadcast");
		Ok(())
	}

	fn schedule_close(&self, intent_id: u64) {
		let close_tx = self.close_tx.clone();
		let window = self.quote_window;
		tokio::spawn(async move {
			tokio::time::sleep(window).await;
			// Engine gone means nothing left to close.
			let _ = close_tx.send(intent_id);
		});
	}

	/// Records an inbound quote against its open auction.
	pub fn handle_quote(&self, payload: QuotePayload) -> QuoteOutcome {
		let intent_id = payload.intent_id;

		let outcome = self.auctions.update(intent_id, |auction| {
			if payload.output_amount < auction.intent.min_output_amount {
				debug!(
					intent_id,
					agent = %payload.agent_name,
					output = %payload.output_amount,
					min = %auction.intent.min_output_amount,
					"rejecting quote below minimum output"
				);
				return QuoteOutcome::BelowMinimum;
			}

			auction.quotes.push(Quote::from(payload.clone()));
			QuoteOutcome::Accepted(auction.quotes.len())
		});

		match outcome {
			Some(outcome) => {
				if let QuoteOutcome::Accepted(total) = outcome {
					info!(
						intent_id,
						agent = %payload.agent_name,
						output = %payload.output_amount,
						total,
						"quote received"
					);
				}
				outcome
			}
			None => {
				debug!(intent_id, "ignoring quote for unknown or closed auction");
				QuoteOutcome::UnknownAuction
			}
		}
	}

	/// Closes an auction, picks the winner, and reports the outcome.
	///
	/// Idempotent: a second close for the same id is a no-op. Returns the
	/// winning quote, if any.
	pub async fn close_auction(&self, intent_id: u64) -> Option<Quote> {
		let auction = self.auctions.remove(intent_id)?;

		if auction.quotes.is_empty() {
			info!(intent_id, "auction closed with no quotes");
			return None;
		}

		let winner = select_winner(&auction.quotes)?.clone();
		info!(
			intent_id,
			agent = %winner.agent_name,
			winner = %winner.agent,
			output = %winner.output_amount,
			"auction closed"
		);

		let notice = MessagePayload::Winner(WinnerPayload {
			intent_id,
			winner_address: winner.agent,
			output_amount: winner.output_amount,
		});
		if let Err(e) = self.session.broadcast(&notice).await {
			// The winner still settles on chain on its own; losing the
			// notice is not fatal to the auction outcome.
			warn!(intent_id, "failed to broadcast winner notice: {}", e);
		}

		self.feedback.submit(
			winner.agent,
			winner.output_amount,
			auction.intent.min_output_amount,
		);

		Some(winner)
	}

	/// Number of currently open auctions.
	pub fn open_auctions(&self) -> usize {
		self.auctions.len()
	}
}

/// Highest output wins; the strict comparison keeps the earliest of
/// equal-highest quotes, which is a committed tie-break contract.
fn select_winner(quotes: &[Quote]) -> Option<&Quote> {
	let mut best: Option<&Quote> = None;
	for quote in quotes {
		if best.map_or(true, |current| quote.output_amount > current.output_amount) {
			best = Some(quote);
		}
	}
	best
}

#[cfg(test)]
mod tests {
	use super::*;
	use aggregator_channel::ChannelError;
	use aggregator_ledger::LedgerError;
	use alloy_primitives::{address, Address, U256};
	use async_trait::async_trait;
	use std::sync::Mutex;

	struct RecordingSession {
		sent: Mutex<Vec<MessagePayload>>,
	}

	impl RecordingSession {
		fn new() -> Self {
			Self {
				sent: Mutex::new(Vec::new()),
			}
		}

		fn sent(&self) -> Vec<MessagePayload> {
			self.sent.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl OutboundSession for RecordingSession {
		async fn broadcast(&self, payload: &MessagePayload) -> Result<(), ChannelError> {
			self.sent.lock().unwrap().push(payload.clone());
			Ok(())
		}
	}

	struct FixedTokens;

	#[async_trait]
	impl TokenMetadata for FixedTokens {
		async fn token_decimals(&self, token: Address) -> Result<u8, LedgerError> {
			// Distinguishable scales for the two sides of the pair.
			if token == currency0() {
				Ok(6)
			} else {
				Ok(18)
			}
		}
	}

	#[derive(Default)]
	struct RecordingFeedback {
		submitted: Mutex<Vec<(Address, U256, U256)>>,
	}

	impl AuctionFeedback for RecordingFeedback {
		fn submit(&self, winner: Address, winning_output: U256, min_output: U256) {
			self.submitted
				.lock()
				.unwrap()
				.push((winner, winning_output, min_output));
		}
	}

	fn currency0() -> Address {
		address!("00000000000000000000000000000000000000a0")
	}

	fn currency1() -> Address {
		address!("00000000000000000000000000000000000000a1")
	}

	fn agent(n: u8) -> Address {
		Address::from_slice(&[&[0u8; 19][..], &[n]].concat())
	}

	fn pending_intent(id: u64, min_output: u64) -> Intent {
		Intent {
			intent_id: id,
			requester: Address::ZERO,
			currency0: currency0(),
			currency1: currency1(),
			zero_for_one: true,
			amount_in: U256::from(1_500_000u64),
			min_output_amount: U256::from(min_output),
			deadline: 10_000,
			status: aggregator_types::IntentStatus::Pending,
			filled_by: Address::ZERO,
			output_amount: U256::ZERO,
		}
	}

	fn quote(intent_id: u64, n: u8, name: &str, output: u64, timestamp: u64) -> QuotePayload {
		QuotePayload {
			intent_id,
			agent_address: agent(n),
			agent_name: name.to_string(),
			output_amount: U256::from(output),
			timestamp,
		}
	}

	struct Harness {
		manager: AuctionManager,
		session: Arc<RecordingSession>,
		feedback: Arc<RecordingFeedback>,
		close_rx: mpsc::UnboundedReceiver<u64>,
	}

	fn harness(quote_window: Duration) -> Harness {
		let session = Arc::new(RecordingSession::new());
		let feedback = Arc::new(RecordingFeedback::default());
		let (close_tx, close_rx) = mpsc::unbounded_channel();
		let manager = AuctionManager::new(
			Arc::new(ActiveAuctions::new()),
			session.clone(),
			Arc::new(FixedTokens),
			feedback.clone(),
			quote_window,
			close_tx,
		);
		Harness {
			manager,
			session,
			feedback,
			close_rx,
		}
	}

	#[tokio::test]
	async fn non_pending_intent_is_a_no_op() {
		let h = harness(Duration::from_secs(5));
		let mut intent = pending_intent(1, 1_000);
		intent.status = aggregator_types::IntentStatus::Filled;

		assert!(!h.manager.open_auction(intent).await.unwrap());
		assert_eq!(h.manager.open_auctions(), 0);
		assert!(h.session.sent().is_empty());
	}

	#[tokio::test]
	async fn double_open_yields_exactly_one_auction() {
		let h = harness(Duration::from_secs(5));

		assert!(h.manager.open_auction(pending_intent(7, 1_000)).await.unwrap());
		assert!(!h.manager.open_auction(pending_intent(7, 1_000)).await.unwrap());

		assert_eq!(h.manager.open_auctions(), 1);
		// Exactly one RFQ went out.
		let sent = h.session.sent();
		assert_eq!(sent.len(), 1);
		match &sent[0] {
			MessagePayload::Rfq(rfq) => {
				assert_eq!(rfq.intent_id, 7);
				assert_eq!(rfq.min_output_amount, U256::from(1_000u64));
				assert_eq!(rfq.currency0_decimals, 6);
				assert_eq!(rfq.currency1_decimals, 18);
			}
			other => panic!("expected rfq, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn below_minimum_quotes_never_reach_selection() {
		let h = harness(Duration::from_secs(5));
		h.manager.open_auction(pending_intent(7, 1_000)).await.unwrap();

		assert_eq!(
			h.manager.handle_quote(quote(7, 1, "lowball", 999, 1)),
			QuoteOutcome::BelowMinimum
		);
		assert_eq!(
			h.manager.handle_quote(quote(7, 2, "fair", 1_000, 2)),
			QuoteOutcome::Accepted(1)
		);

		let winner = h.manager.close_auction(7).await.unwrap();
		assert_eq!(winner.agent, agent(2));
	}

	#[tokio::test]
	async fn winner_selection_keeps_earliest_equal_highest() {
		let h = harness(Duration::from_secs(5));
		h.manager.open_auction(pending_intent(7, 50)).await.unwrap();

		h.manager.handle_quote(quote(7, 1, "A", 100, 1));
		h.manager.handle_quote(quote(7, 2, "B", 120, 2));
		h.manager.handle_quote(quote(7, 3, "C", 120, 3));

		let winner = h.manager.close_auction(7).await.unwrap();
		assert_eq!(winner.agent_name, "B");
		assert_eq!(winner.output_amount, U256::from(120u64));

		// The winner notice names B.
		let sent = h.session.sent();
		match sent.last().unwrap() {
			MessagePayload::Winner(notice) => {
				assert_eq!(notice.winner_address, agent(2));
				assert_eq!(notice.output_amount, U256::from(120u64));
			}
			other => panic!("expected winner notice, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn close_is_idempotent() {
		let h = harness(Duration::from_secs(5));
		h.manager.open_auction(pending_intent(7, 50)).await.unwrap();
		h.manager.handle_quote(quote(7, 1, "A", 100, 1));

		assert!(h.manager.close_auction(7).await.is_some());
		assert!(h.manager.close_auction(7).await.is_none());

		// One RFQ, one winner notice, nothing duplicated.
		assert_eq!(h.session.sent().len(), 2);
		assert_eq!(h.feedback.submitted.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn zero_quote_auction_closes_silently() {
		let h = harness(Duration::from_secs(5));
		h.manager.open_auction(pending_intent(7, 50)).await.unwrap();

		assert!(h.manager.close_auction(7).await.is_none());
		assert_eq!(h.manager.open_auctions(), 0);

		// Only the RFQ was broadcast, and no feedback was attempted.
		assert_eq!(h.session.sent().len(), 1);
		assert!(h.feedback.submitted.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn quotes_for_unknown_auctions_are_dropped() {
		let h = harness(Duration::from_secs(5));
		assert_eq!(
			h.manager.handle_quote(quote(9, 1, "eager", 2_000, 1)),
			QuoteOutcome::UnknownAuction
		);
	}

	#[tokio::test(start_paused = true)]
	async fn quote_window_scenario_end_to_end() {
		let mut h = harness(Duration::from_millis(5_000));
		h.manager.open_auction(pending_intent(7, 1_000)).await.unwrap();

		tokio::time::sleep(Duration::from_millis(1_000)).await;
		assert_eq!(
			h.manager.handle_quote(quote(7, 1, "X", 1_050, 1_000)),
			QuoteOutcome::Accepted(1)
		);

		tokio::time::sleep(Duration::from_millis(2_000)).await;
		assert_eq!(
			h.manager.handle_quote(quote(7, 2, "Y", 1_100, 3_000)),
			QuoteOutcome::Accepted(2)
		);

		// The close timer fires at the end of the 5s window.
		let closed_id = h.close_rx.recv().await.unwrap();
		assert_eq!(closed_id, 7);
		let winner = h.manager.close_auction(closed_id).await.unwrap();
		assert_eq!(winner.agent_name, "Y");
		assert_eq!(winner.output_amount, U256::from(1_100u64));

		// Z is too late: the auction is gone.
		tokio::time::sleep(Duration::from_millis(1_000)).await;
		assert_eq!(
			h.manager.handle_quote(quote(7, 3, "Z", 1_200, 6_000)),
			QuoteOutcome::UnknownAuction
		);

		// Feedback got the winning output against the intent floor.
		let submitted = h.feedback.submitted.lock().unwrap().clone();
		assert_eq!(submitted, vec![(agent(2), U256::from(1_100u64), U256::from(1_000u64))]);
	}
}
