//! Configuration types for the aggregator.

use serde::Deserialize;
use std::collections::HashMap;

/// Top-level aggregator configuration, parsed from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub ledger: LedgerConfig,
	pub relay: RelayConfig,
	#[serde(default)]
	pub auction: AuctionConfig,
	pub account: AccountConfig,
	/// Optional reputation reporting; auctions run identically without it.
	pub reputation: Option<ReputationConfig>,
}

/// Ledger RPC endpoint and the intent book contract to watch.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
	pub rpc_url: String,
	/// Address of the intent book contract emitting creation events.
	pub intent_book: String,
}

/// Relay connection and session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
	pub url: String,
	/// Application name announced during authentication.
	#[serde(default = "default_application")]
	pub application: String,
	/// Scope requested during authentication.
	#[serde(default = "default_scope")]
	pub scope: String,
	/// Asset named in the session allowance list.
	#[serde(default = "default_asset")]
	pub asset: String,
	/// Per-step handshake and request timeout.
	#[serde(default = "default_auth_timeout_ms")]
	pub auth_timeout_ms: u64,
	/// Keepalive ping interval once authenticated.
	#[serde(default = "default_heartbeat_interval_ms")]
	pub heartbeat_interval_ms: u64,
	/// Auth credential lifetime in seconds.
	#[serde(default = "default_session_ttl_secs")]
	pub session_ttl_secs: u64,
	/// Reuse a pre-created session instead of creating one at startup.
	pub session_id: Option<String>,
	/// Additional session participants (agent addresses).
	#[serde(default)]
	pub participants: Vec<String>,
}

/// Auction timing knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuctionConfig {
	/// How long an auction accepts quotes after the RFQ broadcast.
	pub quote_window_ms: u64,
	/// Ledger polling interval for the scanner.
	pub poll_interval_ms: u64,
	/// How far behind the head the first scan starts.
	pub lookback_blocks: u64,
}

impl Default for AuctionConfig {
	fn default() -> Self {
		Self {
			quote_window_ms: 5000,
			poll_interval_ms: 2000,
			lookback_blocks: 100,
		}
	}
}

/// Signing key configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
	/// Hex-encoded private key; use `${VAR}` substitution rather than
	/// committing key material to the config file.
	pub private_key: String,
}

/// Reputation registry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReputationConfig {
	/// RPC endpoint of the chain hosting the registry.
	pub rpc_url: String,
	/// Reputation registry contract address.
	pub registry: String,
	/// Agent ledger address -> registry identity id.
	#[serde(default)]
	pub agents: HashMap<String, u64>,
}

fn default_application() -> String {
	"intent-auctions".to_string()
}

fn default_scope() -> String {
	"app.create".to_string()
}

fn default_asset() -> String {
	"usdc".to_string()
}

fn default_auth_timeout_ms() -> u64 {
	15_000
}

fn default_heartbeat_interval_ms() -> u64 {
	30_000
}

fn default_session_ttl_secs() -> u64 {
	86_400
}
