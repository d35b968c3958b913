//! Authentication handshake payloads.
//!
//! The relay authenticates a long-term wallet key and authorizes a
//! secondary per-connection session key. The wallet proves control by
//! signing a typed, domain-separated credential over the requested scope,
//! the session key, the expiry, the allowance list, and the server's
//! challenge nonce.

use alloy_primitives::{Address, B256};
use alloy_sol_types::{eip712_domain, sol, SolStruct};
use serde_json::{json, Value};

sol! {
	/// Spending allowance granted to the session key.
	struct Allowance {
		string asset;
		string amount;
	}

	/// Credential binding signed by the long-term key.
	struct SessionCredential {
		string scope;
		address wallet;
		address sessionKey;
		uint64 expiresAt;
		Allowance[] allowances;
		string challenge;
	}
}

/// EIP-712 signing hash for a session credential.
pub fn credential_signing_hash(credential: &SessionCredential) -> B256 {
	let domain = eip712_domain! {
		name: "intent-relay",
		version: "1",
	};
	credential.eip712_signing_hash(&domain)
}

/// Parameters of the initial, unsigned `auth_request`.
pub fn auth_request_params(
	wallet: Address,
	session_key: Address,
	application: &str,
	scope: &str,
	asset: &str,
	expires_at: u64,
) -> Value {
	json!({
		"address": wallet,
		"session_key": session_key,
		"application": application,
		"allowances": [{"asset": asset, "amount": "0"}],
		"expires_at": expires_at,
		"scope": scope,
	})
}

/// Extracts the challenge nonce from an `auth_challenge` response.
pub fn parse_challenge(params: &Value) -> Option<String> {
	params
		.get("challenge")
		.and_then(Value::as_str)
		.map(str::to_string)
}

/// Whether an `auth_verify` response reports success.
pub fn parse_auth_result(params: &Value) -> bool {
	params
		.get("success")
		.and_then(Value::as_bool)
		.unwrap_or(false)
}
