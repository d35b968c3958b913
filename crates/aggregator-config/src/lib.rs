//! Configuration loading for the aggregator.
//!
//! Configuration lives in a TOML file with `${VAR}` environment-variable
//! substitution, plus a small set of `AGGREGATOR_*` overrides for the
//! values most often changed between deployments.

use std::env;
use std::path::Path;
use thiserror::Error;

mod types;

pub use types::{
	AccountConfig, AuctionConfig, Config, LedgerConfig, RelayConfig, ReputationConfig,
};

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
	file_path: Option<String>,
	env_prefix: String,
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "AGGREGATOR_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_string_lossy().to_string());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<Config, ConfigError> {
		let file_path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;

		let mut config = self.load_from_file(file_path).await?;
		self.apply_env_overrides(&mut config)?;
		self.validate(&config)?;

		Ok(config)
	}

	async fn load_from_file(&self, file_path: &str) -> Result<Config, ConfigError> {
		let content = tokio::fs::read_to_string(file_path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(file_path.to_string())
			} else {
				ConfigError::IoError(e)
			}
		})?;

		let substituted = self.substitute_env_vars(&content)?;

		toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))
	}

	fn substitute_env_vars(&self, content: &str) -> Result<String, ConfigError> {
		let mut result = content.to_string();

		// Find and replace ${VAR_NAME} patterns
		let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");

		for cap in re.captures_iter(content) {
			let full_match = &cap[0];
			let var_name = &cap[1];

			let env_value = env::var(var_name)
				.map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

			result = result.replace(full_match, &env_value);
		}

		Ok(result)
	}

	fn apply_env_overrides(&self, config: &mut Config) -> Result<(), ConfigError> {
		if let Ok(url) = env::var(format!("{}RELAY_URL", self.env_prefix)) {
			config.relay.url = url;
		}

		if let Ok(session_id) = env::var(format!("{}SESSION_ID", self.env_prefix)) {
			config.relay.session_id = Some(session_id);
		}

		if let Ok(window) = env::var(format!("{}QUOTE_WINDOW_MS", self.env_prefix)) {
			config.auction.quote_window_ms = window.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid quote window: {}", e))
			})?;
		}

		if let Ok(interval) = env::var(format!("{}POLL_INTERVAL_MS", self.env_prefix)) {
			config.auction.poll_interval_ms = interval.parse().map_err(|e| {
				ConfigError::ValidationError(format!("Invalid poll interval: {}", e))
			})?;
		}

		Ok(())
	}

	fn validate(&self, config: &Config) -> Result<(), ConfigError> {
		if !config.relay.url.starts_with("ws://") && !config.relay.url.starts_with("wss://") {
			return Err(ConfigError::ValidationError(
				"relay.url must use ws:// or wss://".to_string(),
			));
		}

		validate_address("ledger.intent_book", &config.ledger.intent_book)?;

		validate_private_key(&config.account.private_key)?;

		if let Some(reputation) = &config.reputation {
			validate_address("reputation.registry", &reputation.registry)?;
			for address in reputation.agents.keys() {
				validate_address("reputation.agents", address)?;
			}
		}

		if config.auction.quote_window_ms == 0 {
			return Err(ConfigError::ValidationError(
				"auction.quote_window_ms must be greater than zero".to_string(),
			));
		}

		Ok(())
	}
}

fn validate_address(field: &str, value: &str) -> Result<(), ConfigError> {
	let hex_part = value.strip_prefix("0x").unwrap_or(value);
	if value.len() != 42 || !value.starts_with("0x") || !is_hex(hex_part) {
		return Err(ConfigError::ValidationError(format!(
			"{} must be a 0x-prefixed 20-byte hex address, got {:?}",
			field, value
		)));
	}
	Ok(())
}

fn validate_private_key(value: &str) -> Result<(), ConfigError> {
	let key = value.strip_prefix("0x").unwrap_or(value);
	if key.len() != 64 || !is_hex(key) {
		return Err(ConfigError::ValidationError(
			"account.private_key must be 64 hex characters (32 bytes)".to_string(),
		));
	}
	Ok(())
}

fn is_hex(value: &str) -> bool {
	!value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const SAMPLE: &str = r#"
[ledger]
rpc_url = "http://127.0.0.1:8545"
intent_book = "0x00000000000000000000000000000000000000aa"

[relay]
url = "wss://relay.example.com/ws"

[account]
private_key = "${AGG_TEST_PRIVATE_KEY}"

[auction]
quote_window_ms = 750

[reputation]
rpc_url = "http://127.0.0.1:8546"
registry = "0x00000000000000000000000000000000000000bb"

[reputation.agents]
"0x00000000000000000000000000000000000000cc" = 42
"#;

	fn write_config(content: &str) -> tempfile::NamedTempFile {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(content.as_bytes()).unwrap();
		file
	}

	#[tokio::test]
	async fn loads_with_env_substitution_and_defaults() {
		std::env::set_var(
			"AGG_TEST_PRIVATE_KEY",
			"0x2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6",
		);
		let file = write_config(SAMPLE);

		let config = ConfigLoader::new()
			.with_env_prefix("AGG_NO_OVERRIDES_")
			.with_file(file.path())
			.load()
			.await
			.unwrap();

		assert!(config.account.private_key.starts_with("0x2a87"));
		assert_eq!(config.auction.quote_window_ms, 750);
		// Untouched fields keep their defaults.
		assert_eq!(config.auction.poll_interval_ms, 2000);
		assert_eq!(config.relay.heartbeat_interval_ms, 30_000);
		let reputation = config.reputation.unwrap();
		assert_eq!(
			reputation.agents["0x00000000000000000000000000000000000000cc"],
			42
		);
	}

	#[tokio::test]
	async fn missing_substitution_variable_is_an_error() {
		let file = write_config(SAMPLE.replace("AGG_TEST_PRIVATE_KEY", "AGG_TEST_UNSET").as_str());

		let err = ConfigLoader::new()
			.with_file(file.path())
			.load()
			.await
			.unwrap_err();

		assert!(matches!(err, ConfigError::EnvVarNotFound(var) if var == "AGG_TEST_UNSET"));
	}

	#[tokio::test]
	async fn rejects_non_websocket_relay_url() {
		std::env::set_var(
			"AGG_TEST_PRIVATE_KEY",
			"0x2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6",
		);
		let file = write_config(
			SAMPLE
				.replace("wss://relay.example.com/ws", "https://relay.example.com")
				.as_str(),
		);

		let err = ConfigLoader::new()
			.with_file(file.path())
			.load()
			.await
			.unwrap_err();

		assert!(matches!(err, ConfigError::ValidationError(_)));
	}
}
