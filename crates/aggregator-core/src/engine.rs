//! Engine loop and service wiring.

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

use aggregator_account::{AccountService, LocalWallet};
use aggregator_channel::{
	ChannelConfig, OutboundSession, RelayChannel, SessionAllocation,
};
use aggregator_config::Config;
use aggregator_discovery::{IntentScanner, ScannerConfig};
use aggregator_ledger::{IntentBook, IntentLedger, LedgerClient, TokenMetadata};
use aggregator_reputation::{AuctionFeedback, NoopFeedback, ReputationService};
use aggregator_types::{ActiveAuctions, Intent, MessagePayload, QuotePayload};

use crate::auction::AuctionManager;
use crate::EngineError;

/// The aggregator's single thread of control.
///
/// Multiplexes the three mutation sources of the active-auction set
/// (discovered intents, inbound quotes, close-timer firings) so every
/// mutation happens at a well-defined point in one loop.
pub struct AggregatorEngine {
	channel: Arc<RelayChannel>,
	scanner: Arc<IntentScanner>,
	manager: Arc<AuctionManager>,
	session_id: Option<String>,
	participants: Vec<Address>,
	asset: String,
	intent_tx: mpsc::UnboundedSender<Intent>,
	intent_rx: Mutex<Option<mpsc::UnboundedReceiver<Intent>>>,
	quote_tx: mpsc::UnboundedSender<QuotePayload>,
	quote_rx: Mutex<Option<mpsc::UnboundedReceiver<QuotePayload>>>,
	close_rx: Mutex<Option<mpsc::UnboundedReceiver<u64>>>,
	shutdown: watch::Sender<bool>,
}

impl AggregatorEngine {
	/// Connects, binds the app session, and runs until [`stop`] is called.
	///
	/// Channel setup failures (connection, authentication, session
	/// creation) are fatal and propagate to the caller; everything after
	/// startup is logged and absorbed.
	///
	/// [`stop`]: AggregatorEngine::stop
	pub async fn run(&self) -> Result<(), EngineError> {
		self.channel.connect().await?;
		self.bind_session().await?;

		// Forward inbound agent quotes into the engine loop.
		let quote_tx = self.quote_tx.clone();
		self.channel
			.on_message(move |msg| {
				if msg.method != "message" {
					return Ok(());
				}
				match serde_json::from_value::<MessagePayload>(msg.params.clone()) {
					Ok(MessagePayload::Quote(quote)) => {
						quote_tx.send(quote).ok();
					}
					// Our own RFQ and winner broadcasts echo back through
					// the session; nothing to do with them.
					Ok(_) => {}
					Err(e) => debug!("ignoring non-payload message: {}", e),
				}
				Ok(())
			})
			.await;

		let scanner = Arc::clone(&self.scanner);
		let intent_tx = self.intent_tx.clone();
		let scanner_shutdown = self.shutdown.subscribe();
		tokio::spawn(async move {
			scanner.run(intent_tx, scanner_shutdown).await;
		});

		let mut intent_rx = self
			.intent_rx
			.lock()
			.await
			.take()
			.ok_or_else(|| EngineError::Config("engine already running".to_string()))?;
		let mut quote_rx = self
			.quote_rx
			.lock()
			.await
			.take()
			.ok_or_else(|| EngineError::Config("engine already running".to_string()))?;
		let mut close_rx = self
			.close_rx
			.lock()
			.await
			.take()
			.ok_or_else(|| EngineError::Config("engine already running".to_string()))?;
		let mut shutdown_rx = self.shutdown.subscribe();
		if *shutdown_rx.borrow() {
			return Ok(());
		}

		info!("watching for intents");

		loop {
			tokio::select! {
				Some(intent) = intent_rx.recv() => {
					let intent_id = intent.intent_id;
					if let Err(e) = self.manager.open_auction(intent).await {
						warn!(intent_id, "failed to open auction: {}", e);
					}
				}

				Some(quote) = quote_rx.recv() => {
					self.manager.handle_quote(quote);
				}

				Some(intent_id) = close_rx.recv() => {
					self.manager.close_auction(intent_id).await;
				}

				_ = shutdown_rx.changed() => {
					if *shutdown_rx.borrow() {
						info!("engine stopping");
						break;
					}
				}
			}
		}

		Ok(())
	}

	/// Signals the loops to stop and drops the relay connection.
	/// In-flight ledger calls are not forcibly aborted.
	pub async fn stop(&self) {
		self.shutdown.send(true).ok();
		self.channel.disconnect().await;
	}

	/// The relay channel, exposed for the session setup utility.
	pub fn channel(&self) -> &Arc<RelayChannel> {
		&self.channel
	}

	/// Participants of a newly created session: the aggregator itself
	/// plus the configured agents.
	pub fn session_participants(&self) -> Vec<Address> {
		self.participants.clone()
	}

	/// One-shot session setup: connect, authenticate, create the app
	/// session for the configured participant set, and return its id for
	/// distribution to agents.
	pub async fn setup_session(&self) -> Result<String, EngineError> {
		self.channel.connect().await?;

		let allocations = self
			.participants
			.iter()
			.map(|participant| SessionAllocation::empty(&self.asset, *participant))
			.collect();
		let session_id = self
			.channel
			.create_session(self.participants.clone(), allocations)
			.await?;

		self.channel.disconnect().await;
		Ok(session_id)
	}

	async fn bind_session(&self) -> Result<(), EngineError> {
		if let Some(session_id) = &self.session_id {
			info!(session = %session_id, "using pre-created app session");
			self.channel.bind_session(session_id.clone()).await;
			return Ok(());
		}

		let allocations = self
			.participants
			.iter()
			.map(|participant| SessionAllocation::empty(&self.asset, *participant))
			.collect();
		self.channel
			.create_session(self.participants.clone(), allocations)
			.await?;
		Ok(())
	}
}

/// Wires the services described by a [`Config`] into an engine.
pub struct AggregatorBuilder {
	config: Config,
}

impl AggregatorBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub async fn build(self) -> Result<AggregatorEngine, EngineError> {
		let config = self.config;

		let account = Arc::new(AccountService::new(Box::new(LocalWallet::new(
			&config.account.private_key,
		)?)));
		let aggregator_address = account.address();
		info!(address = %aggregator_address, "aggregator identity loaded");

		// Ledger side.
		let ledger = Arc::new(LedgerClient::connect(&config.ledger.rpc_url, account.clone()).await?);
		let intent_book_address = parse_address("ledger.intent_book", &config.ledger.intent_book)?;
		let intent_book = Arc::new(IntentBook::new(ledger, intent_book_address));

		// Relay side.
		let channel_config = ChannelConfig {
			url: config.relay.url.clone(),
			application: config.relay.application.clone(),
			scope: config.relay.scope.clone(),
			asset: config.relay.asset.clone(),
			step_timeout: Duration::from_millis(config.relay.auth_timeout_ms),
			heartbeat_interval: Duration::from_millis(config.relay.heartbeat_interval_ms),
			session_ttl: Duration::from_secs(config.relay.session_ttl_secs),
			..ChannelConfig::default()
		};
		let channel = Arc::new(RelayChannel::new(channel_config, account.clone()));

		// Reputation side, when configured.
		let feedback: Arc<dyn AuctionFeedback> = match &config.reputation {
			Some(reputation) => {
				let registry_ledger =
					Arc::new(LedgerClient::connect(&reputation.rpc_url, account.clone()).await?);
				let registry = parse_address("reputation.registry", &reputation.registry)?;

				let mut identities = HashMap::new();
				for (address, identity) in &reputation.agents {
					identities.insert(
						parse_address("reputation.agents", address)?,
						U256::from(*identity),
					);
				}

				let service = ReputationService::new(registry_ledger, registry, identities);
				info!(
					agents = service.mapped_agents(),
					"reputation reporting enabled"
				);
				Arc::new(service)
			}
			None => Arc::new(NoopFeedback),
		};

		let auctions = Arc::new(ActiveAuctions::new());

		let scanner = Arc::new(IntentScanner::new(
			Arc::clone(&intent_book) as Arc<dyn IntentLedger>,
			Arc::clone(&auctions),
			ScannerConfig {
				poll_interval: Duration::from_millis(config.auction.poll_interval_ms),
				lookback_blocks: config.auction.lookback_blocks,
			},
		));

		let (intent_tx, intent_rx) = mpsc::unbounded_channel();
		let (quote_tx, quote_rx) = mpsc::unbounded_channel();
		let (close_tx, close_rx) = mpsc::unbounded_channel();
		let (shutdown, _) = watch::channel(false);

		let manager = Arc::new(AuctionManager::new(
			auctions,
			Arc::clone(&channel) as Arc<dyn OutboundSession>,
			intent_book as Arc<dyn TokenMetadata>,
			feedback,
			Duration::from_millis(config.auction.quote_window_ms),
			close_tx,
		));

		let mut participants = vec![aggregator_address];
		for raw in &config.relay.participants {
			participants.push(parse_address("relay.participants", raw)?);
		}

		Ok(AggregatorEngine {
			channel,
			scanner,
			manager,
			session_id: config.relay.session_id.clone(),
			participants,
			asset: config.relay.asset.clone(),
			intent_tx,
			intent_rx: Mutex::new(Some(intent_rx)),
			quote_tx,
			quote_rx: Mutex::new(Some(quote_rx)),
			close_rx: Mutex::new(Some(close_rx)),
			shutdown,
		})
	}
}

fn parse_address(field: &str, raw: &str) -> Result<Address, EngineError> {
	raw.parse()
		.map_err(|e| EngineError::Config(format!("{}: invalid address {:?}: {}", field, raw, e)))
}
