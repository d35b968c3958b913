//! Authenticated relay messaging for the aggregator.
//!
//! Maintains exactly one live WebSocket connection to the relay service,
//! runs the challenge/response authentication handshake, and provides
//! correlated request/response messaging plus fan-out delivery of inbound
//! application messages. Group messaging happens inside an app session
//! created once per process lifetime and reused for every auction.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use aggregator_types::MessagePayload;

mod auth;
mod channel;
mod frame;

pub use channel::{RelayChannel, SessionAllocation};
pub use frame::{RelayFrame, RpcMessage};

#[derive(Debug, Error)]
pub enum ChannelError {
	#[error("Connection error: {0}")]
	Connection(String),

	#[error("Authentication error: {0}")]
	Authentication(String),

	#[error("Session creation error: {0}")]
	SessionCreation(String),

	#[error("Request {method} timed out after {timeout_ms} ms")]
	RequestTimeout { method: String, timeout_ms: u64 },

	#[error("Not connected to relay")]
	NotConnected,

	#[error("No session bound")]
	NoSession,

	#[error("Frame error: {0}")]
	Frame(String),

	#[error("Signing error: {0}")]
	Signing(String),
}

/// Connection lifecycle, owned exclusively by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	AwaitingChallenge,
	AwaitingVerification,
	Authenticated,
}

/// Relay connection settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
	pub url: String,
	/// Application name announced during authentication.
	pub application: String,
	/// Scope requested during authentication.
	pub scope: String,
	/// Asset named in the allowance list.
	pub asset: String,
	/// Timeout for opening the transport.
	pub connect_timeout: Duration,
	/// Per-step timeout for handshake waits and correlated requests.
	pub step_timeout: Duration,
	/// Keepalive ping interval once authenticated.
	pub heartbeat_interval: Duration,
	/// Credential lifetime granted to the session key.
	pub session_ttl: Duration,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			url: "wss://relay.invalid/ws".to_string(),
			application: "intent-auctions".to_string(),
			scope: "app.create".to_string(),
			asset: "usdc".to_string(),
			connect_timeout: Duration::from_secs(10),
			step_timeout: Duration::from_secs(15),
			heartbeat_interval: Duration::from_secs(30),
			session_ttl: Duration::from_secs(86_400),
		}
	}
}

/// Broadcast access to the bound app session.
///
/// The auction manager talks to the relay exclusively through this trait
/// so it can be tested against an in-memory session.
#[async_trait]
pub trait OutboundSession: Send + Sync {
	async fn broadcast(&self, payload: &MessagePayload) -> Result<(), ChannelError>;
}
