//! Relay wire frames.
//!
//! The relay speaks JSON frames of the shape
//! `{"req": [id, method, params, ts], "sig": [..]}` for requests and
//! `{"res": [id, method, params, ts], "sig": [..]}` for responses.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ChannelError;

/// One RPC message, independent of its request/response framing.
#[derive(Debug, Clone)]
pub struct RpcMessage {
	pub id: u64,
	pub method: String,
	pub params: Value,
	/// Sender-side millisecond timestamp.
	pub timestamp: u64,
}

impl RpcMessage {
	pub fn new(id: u64, method: impl Into<String>, params: Value, timestamp: u64) -> Self {
		Self {
			id,
			method: method.into(),
			params,
			timestamp,
		}
	}

	/// Canonical byte encoding signed by the session key: the JSON array
	/// `[id, method, params, ts]`, exactly as it appears on the wire.
	pub fn signing_bytes(&self) -> Result<Vec<u8>, ChannelError> {
		serde_json::to_vec(&(self.id, &self.method, &self.params, self.timestamp))
			.map_err(|e| ChannelError::Frame(e.to_string()))
	}
}

/// A framed message as sent over the transport.
#[derive(Debug, Clone)]
pub enum RelayFrame {
	Request {
		message: RpcMessage,
		signatures: Vec<String>,
	},
	Response {
		message: RpcMessage,
		signatures: Vec<String>,
	},
}

#[derive(Serialize, Deserialize)]
struct WireFrame {
	#[serde(skip_serializing_if = "Option::is_none")]
	req: Option<(u64, String, Value, u64)>,
	#[serde(skip_serializing_if = "Option::is_none")]
	res: Option<(u64, String, Value, u64)>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	sig: Vec<String>,
}

impl RelayFrame {
	pub fn request(message: RpcMessage, signatures: Vec<String>) -> Self {
		RelayFrame::Request {
			message,
			signatures,
		}
	}

	pub fn response(message: RpcMessage, signatures: Vec<String>) -> Self {
		RelayFrame::Response {
			message,
			signatures,
		}
	}

	pub fn message(&self) -> &RpcMessage {
		match self {
			RelayFrame::Request { message, .. } => message,
			RelayFrame::Response { message, .. } => message,
		}
	}

	pub fn into_message(self) -> RpcMessage {
		match self {
			RelayFrame::Request { message, .. } => message,
			RelayFrame::Response { message, .. } => message,
		}
	}

	pub fn is_response(&self) -> bool {
		matches!(self, RelayFrame::Response { .. })
	}

	pub fn to_json(&self) -> Result<String, ChannelError> {
		let (message, signatures, is_response) = match self {
			RelayFrame::Request {
				message,
				signatures,
			} => (message, signatures, false),
			RelayFrame::Response {
				message,
				signatures,
			} => (message, signatures, true),
		};

		let tuple = (
			message.id,
			message.method.clone(),
			message.params.clone(),
			message.timestamp,
		);
		let wire = if is_response {
			WireFrame {
				req: None,
				res: Some(tuple),
				sig: signatures.clone(),
			}
		} else {
			WireFrame {
				req: Some(tuple),
				res: None,
				sig: signatures.clone(),
			}
		};

		serde_json::to_string(&wire).map_err(|e| ChannelError::Frame(e.to_string()))
	}

	pub fn parse(raw: &str) -> Result<Self, ChannelError> {
		let wire: WireFrame =
			serde_json::from_str(raw).map_err(|e| ChannelError::Frame(e.to_string()))?;

		if let Some((id, method, params, timestamp)) = wire.res {
			return Ok(RelayFrame::Response {
				message: RpcMessage::new(id, method, params, timestamp),
				signatures: wire.sig,
			});
		}

		if let Some((id, method, params, timestamp)) = wire.req {
			return Ok(RelayFrame::Request {
				message: RpcMessage::new(id, method, params, timestamp),
				signatures: wire.sig,
			});
		}

		Err(ChannelError::Frame(
			"frame carries neither req nor res".to_string(),
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn request_frame_round_trips() {
		let frame = RelayFrame::request(
			RpcMessage::new(3, "message", json!({"type": "rfq", "intentId": 7}), 1_700),
			vec!["0xabcd".to_string()],
		);

		let raw = frame.to_json().unwrap();
		assert!(raw.contains("\"req\":[3,\"message\""));
		assert!(!raw.contains("\"res\""));

		let parsed = RelayFrame::parse(&raw).unwrap();
		assert!(!parsed.is_response());
		let msg = parsed.message();
		assert_eq!(msg.id, 3);
		assert_eq!(msg.method, "message");
		assert_eq!(msg.params["intentId"], 7);
	}

	#[test]
	fn response_frame_parses_with_missing_sig() {
		let parsed =
			RelayFrame::parse(r#"{"res": [9, "auth_challenge", {"challenge": "n"}, 0]}"#).unwrap();
		assert!(parsed.is_response());
		assert_eq!(parsed.message().method, "auth_challenge");
	}

	#[test]
	fn rejects_frames_without_req_or_res() {
		assert!(RelayFrame::parse(r#"{"sig": []}"#).is_err());
		assert!(RelayFrame::parse("not json").is_err());
	}

	#[test]
	fn signing_bytes_match_wire_tuple() {
		let msg = RpcMessage::new(1, "ping", json!({}), 42);
		assert_eq!(msg.signing_bytes().unwrap(), br#"[1,"ping",{},42]"#);
	}
}
