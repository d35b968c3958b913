//! Relay connection management.

use alloy_primitives::Address;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use aggregator_account::{AccountInterface, AccountService, LocalWallet};
use aggregator_types::{now_millis, now_secs, MessagePayload};

use crate::auth::{
	auth_request_params, credential_signing_hash, parse_auth_result, parse_challenge, Allowance,
	SessionCredential,
};
use crate::frame::{RelayFrame, RpcMessage};
use crate::{ChannelConfig, ChannelError, ConnectionState, OutboundSession};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

type MessageHandler = Box<dyn Fn(&RpcMessage) -> anyhow::Result<()> + Send + Sync>;

struct MethodWaiter {
	id: u64,
	method: String,
	tx: oneshot::Sender<RpcMessage>,
}

struct MethodWait {
	id: u64,
	method: String,
	rx: oneshot::Receiver<RpcMessage>,
}

/// Zero-value allocation entry for session creation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionAllocation {
	pub asset: String,
	pub amount: String,
	pub participant: Address,
}

impl SessionAllocation {
	pub fn empty(asset: &str, participant: Address) -> Self {
		Self {
			asset: asset.to_string(),
			amount: "0".to_string(),
			participant,
		}
	}
}

/// One persistent, authenticated relay connection.
///
/// The long-term account key proves identity during the handshake; a
/// freshly generated session key signs everything afterwards. All inbound
/// traffic is routed by the read loop: correlated responses resolve their
/// pending request, handshake frames resolve method waiters, and the rest
/// fans out to registered message handlers.
pub struct RelayChannel {
	config: ChannelConfig,
	account: Arc<AccountService>,
	session_key: LocalWallet,
	state: Arc<RwLock<ConnectionState>>,
	writer: Arc<Mutex<Option<WsSink>>>,
	pending: Arc<Mutex<HashMap<u64, oneshot::Sender<RpcMessage>>>>,
	waiters: Arc<Mutex<Vec<MethodWaiter>>>,
	handlers: Arc<RwLock<Vec<MessageHandler>>>,
	session: Arc<RwLock<Option<String>>>,
	next_id: AtomicU64,
	read_task: Mutex<Option<JoinHandle<()>>>,
	heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl RelayChannel {
	pub fn new(config: ChannelConfig, account: Arc<AccountService>) -> Self {
		Self {
			config,
			account,
			session_key: LocalWallet::random(),
			state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
			writer: Arc::new(Mutex::new(None)),
			pending: Arc::new(Mutex::new(HashMap::new())),
			waiters: Arc::new(Mutex::new(Vec::new())),
			handlers: Arc::new(RwLock::new(Vec::new())),
			session: Arc::new(RwLock::new(None)),
			next_id: AtomicU64::new(1),
			read_task: Mutex::new(None),
			heartbeat_task: Mutex::new(None),
		}
	}

	/// Ledger address of the long-term identity key.
	pub fn wallet_address(&self) -> Address {
		self.account.address()
	}

	/// Address of the per-connection session key.
	pub fn session_key_address(&self) -> Address {
		self.session_key.address()
	}

	pub async fn state(&self) -> ConnectionState {
		*self.state.read().await
	}

	/// The app session used for broadcasts, once bound.
	pub async fn bound_session(&self) -> Option<String> {
		self.session.read().await.clone()
	}

	/// Binds a pre-created session id for subsequent broadcasts.
	pub async fn bind_session(&self, session_id: impl Into<String>) {
		*self.session.write().await = Some(session_id.into());
	}

	/// Opens the transport and runs the authentication handshake.
	///
	/// Resolves only once fully authenticated. Transport failures surface
	/// as [`ChannelError::Connection`]; a handshake step that times out or
	/// is rejected surfaces as [`ChannelError::Authentication`], and the
	/// transport is torn down again.
	pub async fn connect(&self) -> Result<(), ChannelError> {
		{
			let mut state = self.state.write().await;
			if *state != ConnectionState::Disconnected {
				return Err(ChannelError::Connection("already connected".to_string()));
			}
			*state = ConnectionState::Connecting;
		}

		let url = match Url::parse(&self.config.url) {
			Ok(url) if url.scheme() == "ws" || url.scheme() == "wss" => url,
			Ok(url) => {
				*self.state.write().await = ConnectionState::Disconnected;
				return Err(ChannelError::Connection(format!(
					"relay URL must use ws:// or wss://, got {}",
					url.scheme()
				)));
			}
			Err(e) => {
				*self.state.write().await = ConnectionState::Disconnected;
				return Err(ChannelError::Connection(format!("invalid relay URL: {}", e)));
			}
		};

		info!(url = %url, "connecting to relay");

		let ws = match timeout(self.config.connect_timeout, connect_async(url.as_str())).await {
			Ok(Ok((stream, _response))) => stream,
			Ok(Err(e)) => {
				*self.state.write().await = ConnectionState::Disconnected;
				return Err(ChannelError::Connection(e.to_string()));
			}
			Err(_) => {
				*self.state.write().await = ConnectionState::Disconnected;
				return Err(ChannelError::Connection(format!(
					"connect timed out after {:?}",
					self.config.connect_timeout
				)));
			}
		};

		let (sink, source) = ws.split();
		*self.writer.lock().await = Some(sink);
		self.spawn_read_loop(source).await;

		if let Err(e) = self.authenticate().await {
			self.disconnect().await;
			return Err(e);
		}

		self.spawn_heartbeat().await;
		info!("relay connection authenticated");
		Ok(())
	}

	/// Registers a handler for inbound frames that are not correlated
	/// responses. Handler errors are logged, never propagated.
	pub async fn on_message<F>(&self, handler: F)
	where
		F: Fn(&RpcMessage) -> anyhow::Result<()> + Send + Sync + 'static,
	{
		self.handlers.write().await.push(Box::new(handler));
	}

	/// Creates the app session used for quote coordination.
	pub async fn create_session(
		&self,
		participants: Vec<Address>,
		allocations: Vec<SessionAllocation>,
	) -> Result<String, ChannelError> {
		let weights: Vec<u32> = participants.iter().map(|_| 1).collect();
		let params = json!({
			"definition": {
				"application": self.config.application,
				"participants": participants,
				"weights": weights,
				// The aggregator operates the session unilaterally.
				"quorum": 1,
				"challenge": self.config.session_ttl.as_secs(),
			},
			"allocations": allocations,
		});

		let request = self.signed_request("create_app_session", params).await?;
		let response = match self.send_and_wait(request).await {
			Ok(response) => response,
			Err(ChannelError::RequestTimeout { method, timeout_ms }) => {
				return Err(ChannelError::SessionCreation(format!(
					"no {} response within {} ms",
					method, timeout_ms
				)));
			}
			Err(e) => return Err(e),
		};

		let session_id = response
			.params
			.get("app_session_id")
			.and_then(Value::as_str)
			.ok_or_else(|| {
				ChannelError::SessionCreation("response lacks an app_session_id".to_string())
			})?
			.to_string();

		info!(session = %session_id, "created app session");
		self.bind_session(session_id.clone()).await;
		Ok(session_id)
	}

	/// Signs `payload` with the session key, attaches the session id, and
	/// writes it to the transport.
	pub async fn send_message(
		&self,
		session_id: &str,
		payload: &MessagePayload,
	) -> Result<(), ChannelError> {
		let mut params =
			serde_json::to_value(payload).map_err(|e| ChannelError::Frame(e.to_string()))?;
		params["sid"] = json!(session_id);

		let frame = self.signed_request("message", params).await?;
		self.write_frame(&frame).await
	}

	/// Stops the heartbeat and closes the transport. Idempotent.
	pub async fn disconnect(&self) {
		if let Some(task) = self.heartbeat_task.lock().await.take() {
			task.abort();
		}
		if let Some(task) = self.read_task.lock().await.take() {
			task.abort();
		}
		if let Some(mut sink) = self.writer.lock().await.take() {
			let _ = sink.close().await;
			debug!("relay transport closed");
		}
		self.pending.lock().await.clear();
		self.waiters.lock().await.clear();
		*self.state.write().await = ConnectionState::Disconnected;
	}

	// --- handshake ---

	async fn authenticate(&self) -> Result<(), ChannelError> {
		let wallet = self.account.address();
		let session_key = self.session_key.address();
		let expires_at = now_secs() + self.config.session_ttl.as_secs();

		// Step 1: announce identity and session key (unsigned). The
		// waiter is registered first so a prompt reply cannot slip past
		// the read loop.
		let challenge_wait = self.register_waiter("auth_challenge").await;
		let request = RelayFrame::request(
			self.next_message(
				"auth_request",
				auth_request_params(
					wallet,
					session_key,
					&self.config.application,
					&self.config.scope,
					&self.config.asset,
					expires_at,
				),
			),
			Vec::new(),
		);
		self.write_frame(&request).await.map_err(|e| {
			ChannelError::Authentication(format!("failed to send auth_request: {}", e))
		})?;
		*self.state.write().await = ConnectionState::AwaitingChallenge;

		// Step 2: wait for the server challenge.
		let challenge_msg = self
			.await_waiter(challenge_wait)
			.await
			.map_err(|e| ChannelError::Authentication(e.to_string()))?;
		let challenge = parse_challenge(&challenge_msg.params).ok_or_else(|| {
			ChannelError::Authentication("auth_challenge carried no nonce".to_string())
		})?;
		debug!("received auth challenge");

		// Step 3: sign the typed credential with the long-term key.
		let credential = SessionCredential {
			scope: self.config.scope.clone(),
			wallet,
			sessionKey: session_key,
			expiresAt: expires_at,
			allowances: vec![Allowance {
				asset: self.config.asset.clone(),
				amount: "0".to_string(),
			}],
			challenge: challenge.clone(),
		};
		let digest = credential_signing_hash(&credential);
		let signature = self
			.account
			.sign_hash(&digest)
			.await
			.map_err(|e| ChannelError::Authentication(format!("credential signing: {}", e)))?;

		let verdict_wait = self.register_waiter("auth_verify").await;
		let verify = RelayFrame::request(
			self.next_message(
				"auth_verify",
				json!({
					"challenge": challenge,
					"signature": format!("0x{}", hex::encode(signature.as_bytes())),
				}),
			),
			Vec::new(),
		);
		self.write_frame(&verify).await.map_err(|e| {
			ChannelError::Authentication(format!("failed to send auth_verify: {}", e))
		})?;
		*self.state.write().await = ConnectionState::AwaitingVerification;

		// Step 4: wait for the verdict.
		let result = self
			.await_waiter(verdict_wait)
			.await
			.map_err(|e| ChannelError::Authentication(e.to_string()))?;
		if !parse_auth_result(&result.params) {
			return Err(ChannelError::Authentication(
				"relay rejected the credential".to_string(),
			));
		}

		*self.state.write().await = ConnectionState::Authenticated;
		Ok(())
	}

	// --- plumbing ---

	fn next_message(&self, method: &str, params: Value) -> RpcMessage {
		RpcMessage::new(
			self.next_id.fetch_add(1, Ordering::Relaxed),
			method,
			params,
			now_millis(),
		)
	}

	async fn signed_request(
		&self,
		method: &str,
		params: Value,
	) -> Result<RelayFrame, ChannelError> {
		let message = self.next_message(method, params);
		let bytes = message.signing_bytes()?;
		let signature = self
			.session_key
			.sign_message(&bytes)
			.await
			.map_err(|e| ChannelError::Signing(e.to_string()))?;

		Ok(RelayFrame::request(
			message,
			vec![format!("0x{}", hex::encode(signature.as_bytes()))],
		))
	}

	async fn write_frame(&self, frame: &RelayFrame) -> Result<(), ChannelError> {
		let raw = frame.to_json()?;
		let mut writer = self.writer.lock().await;
		let sink = writer.as_mut().ok_or(ChannelError::NotConnected)?;
		sink.send(Message::text(raw))
			.await
			.map_err(|e| ChannelError::Connection(e.to_string()))
	}

	/// Sends a request and waits for the response with the matching id.
	async fn send_and_wait(&self, frame: RelayFrame) -> Result<RpcMessage, ChannelError> {
		let id = frame.message().id;
		let method = frame.message().method.clone();
		let (tx, rx) = oneshot::channel();
		self.pending.lock().await.insert(id, tx);

		if let Err(e) = self.write_frame(&frame).await {
			self.pending.lock().await.remove(&id);
			return Err(e);
		}

		match timeout(self.config.step_timeout, rx).await {
			Ok(Ok(message)) => Ok(message),
			Ok(Err(_)) => Err(ChannelError::Connection("connection closed".to_string())),
			Err(_) => {
				self.pending.lock().await.remove(&id);
				Err(ChannelError::RequestTimeout {
					method,
					timeout_ms: self.config.step_timeout.as_millis() as u64,
				})
			}
		}
	}

	/// Registers interest in the next inbound frame with the given
	/// method. Registration happens before the triggering request is
	/// written so the reply cannot race the wait.
	async fn register_waiter(&self, method: &str) -> MethodWait {
		let waiter_id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = oneshot::channel();
		self.waiters.lock().await.push(MethodWaiter {
			id: waiter_id,
			method: method.to_string(),
			tx,
		});
		MethodWait {
			id: waiter_id,
			method: method.to_string(),
			rx,
		}
	}

	/// Waits on a registered method waiter, ignoring unrelated frames.
	async fn await_waiter(&self, wait: MethodWait) -> Result<RpcMessage, ChannelError> {
		match timeout(self.config.step_timeout, wait.rx).await {
			Ok(Ok(message)) => Ok(message),
			Ok(Err(_)) => Err(ChannelError::Connection("connection closed".to_string())),
			Err(_) => {
				self.waiters.lock().await.retain(|w| w.id != wait.id);
				Err(ChannelError::RequestTimeout {
					method: wait.method,
					timeout_ms: self.config.step_timeout.as_millis() as u64,
				})
			}
		}
	}

	async fn spawn_read_loop(&self, mut source: WsSource) {
		let state = Arc::clone(&self.state);
		let writer = Arc::clone(&self.writer);
		let pending = Arc::clone(&self.pending);
		let waiters = Arc::clone(&self.waiters);
		let handlers = Arc::clone(&self.handlers);

		let task = tokio::spawn(async move {
			while let Some(item) = source.next().await {
				match item {
					Ok(Message::Text(text)) => {
						Self::route(text.as_str(), &pending, &waiters, &handlers).await;
					}
					Ok(Message::Ping(data)) => {
						let mut writer = writer.lock().await;
						if let Some(sink) = writer.as_mut() {
							let _ = sink.send(Message::Pong(data)).await;
						}
					}
					Ok(Message::Close(_)) => {
						info!("relay closed the connection");
						break;
					}
					Ok(_) => {}
					Err(e) => {
						warn!("relay transport error: {}", e);
						break;
					}
				}
			}

			// Fail fast for anyone still waiting on a response.
			pending.lock().await.clear();
			waiters.lock().await.clear();
			*state.write().await = ConnectionState::Disconnected;
		});

		*self.read_task.lock().await = Some(task);
	}

	async fn route(
		raw: &str,
		pending: &Mutex<HashMap<u64, oneshot::Sender<RpcMessage>>>,
		waiters: &Mutex<Vec<MethodWaiter>>,
		handlers: &RwLock<Vec<MessageHandler>>,
	) {
		let frame = match RelayFrame::parse(raw) {
			Ok(frame) => frame,
			Err(e) => {
				debug!("ignoring unparseable frame: {}", e);
				return;
			}
		};

		let is_response = frame.is_response();
		let message = frame.into_message();

		// Correlated response to an in-flight request.
		if is_response {
			if let Some(tx) = pending.lock().await.remove(&message.id) {
				let _ = tx.send(message);
				return;
			}
		}

		// Handshake-style waits on a specific method.
		{
			let mut waiters = waiters.lock().await;
			if let Some(position) = waiters.iter().position(|w| w.method == message.method) {
				let waiter = waiters.remove(position);
				let _ = waiter.tx.send(message);
				return;
			}
		}

		// Everything else fans out to the registered handlers.
		for handler in handlers.read().await.iter() {
			if let Err(e) = handler(&message) {
				warn!("message handler error: {}", e);
			}
		}
	}

	async fn spawn_heartbeat(&self) {
		let interval = self.config.heartbeat_interval;
		let writer = Arc::clone(&self.writer);
		let state = Arc::clone(&self.state);
		// Ping ids live in their own range so a pong can never collide
		// with a pending correlated request.
		let counter = AtomicU64::new(1_000_000_000);

		let task = tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);
			ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
			ticker.tick().await; // first tick fires immediately; skip it

			loop {
				ticker.tick().await;
				if *state.read().await != ConnectionState::Authenticated {
					break;
				}

				let ping = RelayFrame::request(
					RpcMessage::new(
						counter.fetch_add(1, Ordering::Relaxed),
						"ping",
						json!({}),
						now_millis(),
					),
					Vec::new(),
				);
				let raw = match ping.to_json() {
					Ok(raw) => raw,
					Err(_) => continue,
				};

				// Best effort: a failed ping is the read loop's problem.
				let mut writer = writer.lock().await;
				if let Some(sink) = writer.as_mut() {
					if let Err(e) = sink.send(Message::text(raw)).await {
						debug!("heartbeat send failed: {}", e);
					}
				}
			}
		});

		*self.heartbeat_task.lock().await = Some(task);
	}
}

#[async_trait]
impl OutboundSession for RelayChannel {
	async fn broadcast(&self, payload: &MessagePayload) -> Result<(), ChannelError> {
		let session = self
			.session
			.read()
			.await
			.clone()
			.ok_or(ChannelError::NoSession)?;
		self.send_message(&session, payload).await
	}
}
