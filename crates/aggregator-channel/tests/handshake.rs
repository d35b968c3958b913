//! Channel tests against an in-process relay stub.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use aggregator_account::{AccountService, LocalWallet};
use aggregator_channel::{
	ChannelConfig, ChannelError, ConnectionState, OutboundSession, RelayChannel, RelayFrame,
	SessionAllocation,
};
use aggregator_types::{MessagePayload, QuotePayload, RfqPayload};
use alloy_primitives::{Address, U256};

const DEV_KEY: &str = "0x2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6";

fn test_account() -> Arc<AccountService> {
	Arc::new(AccountService::new(Box::new(
		LocalWallet::new(DEV_KEY).unwrap(),
	)))
}

fn test_config(port: u16) -> ChannelConfig {
	ChannelConfig {
		url: format!("ws://127.0.0.1:{}/ws", port),
		connect_timeout: Duration::from_secs(2),
		step_timeout: Duration::from_secs(2),
		heartbeat_interval: Duration::from_secs(60),
		..ChannelConfig::default()
	}
}

fn response(id: u64, method: &str, params: Value) -> Message {
	Message::text(
		json!({
			"res": [id, method, params, 0],
		})
		.to_string(),
	)
}

/// Relay stub: answers the handshake and session creation, forwards every
/// received `message` frame to the test, and pushes frames queued by the
/// test down to the client.
async fn spawn_relay_stub(
	authenticate: bool,
) -> (
	u16,
	mpsc::UnboundedReceiver<RelayFrame>,
	mpsc::UnboundedSender<String>,
) {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	let (seen_tx, seen_rx) = mpsc::unbounded_channel();
	let (push_tx, mut push_rx) = mpsc::unbounded_channel::<String>();

	tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = accept_async(stream).await.unwrap();
		let (mut sink, mut source) = ws.split();

		loop {
			tokio::select! {
				Some(pushed) = push_rx.recv() => {
					let _ = sink.send(Message::text(pushed)).await;
				}
				item = source.next() => {
					let Some(Ok(Message::Text(text))) = item else { break };
					let Ok(frame) = RelayFrame::parse(text.as_str()) else { continue };
					let message = frame.message().clone();
					let _ = seen_tx.send(frame);

					match message.method.as_str() {
						"auth_request" => {
							let _ = sink
								.send(response(message.id, "auth_challenge", json!({"challenge": "nonce-123"})))
								.await;
						}
						"auth_verify" => {
							let _ = sink
								.send(response(
									message.id,
									"auth_verify",
									json!({"success": authenticate}),
								))
								.await;
						}
						"create_app_session" => {
							let _ = sink
								.send(response(
									message.id,
									"create_app_session",
									json!({"app_session_id": "0xsession42"}),
								))
								.await;
						}
						_ => {}
					}
				}
			}
		}
	});

	(port, seen_rx, push_tx)
}

#[tokio::test]
async fn authenticates_creates_session_and_exchanges_messages() {
	let (port, mut seen, push) = spawn_relay_stub(true).await;
	let channel = Arc::new(RelayChannel::new(test_config(port), test_account()));

	// Inbound application messages fan out to registered handlers.
	let (quote_tx, mut quote_rx) = mpsc::unbounded_channel();
	channel
		.on_message(move |msg| {
			if msg.method == "message" {
				if let Ok(MessagePayload::Quote(quote)) =
					serde_json::from_value::<MessagePayload>(msg.params.clone())
				{
					quote_tx.send(quote).ok();
				}
			}
			Ok(())
		})
		.await;

	channel.connect().await.unwrap();
	assert_eq!(channel.state().await, ConnectionState::Authenticated);

	// The handshake announced identity and a distinct session key.
	let auth_request = seen.recv().await.unwrap();
	assert_eq!(auth_request.message().method, "auth_request");
	assert_ne!(channel.session_key_address(), channel.wallet_address());

	let auth_verify = seen.recv().await.unwrap();
	assert_eq!(auth_verify.message().method, "auth_verify");
	assert!(auth_verify.message().params["signature"]
		.as_str()
		.unwrap()
		.starts_with("0x"));

	// Session creation correlates on the request id.
	let session_id = channel
		.create_session(
			vec![channel.wallet_address()],
			vec![SessionAllocation::empty("usdc", channel.wallet_address())],
		)
		.await
		.unwrap();
	assert_eq!(session_id, "0xsession42");
	let create = seen.recv().await.unwrap();
	assert_eq!(create.message().method, "create_app_session");

	// Outbound broadcasts are signed and tagged with the session id.
	let rfq = MessagePayload::Rfq(RfqPayload {
		intent_id: 7,
		amount_in: U256::from(1_500_000u64),
		min_output_amount: U256::from(1_000u64),
		zero_for_one: true,
		currency0: Address::ZERO,
		currency1: Address::ZERO,
		currency0_decimals: 6,
		currency1_decimals: 18,
		deadline: 99,
	});
	channel.broadcast(&rfq).await.unwrap();

	let broadcast = seen.recv().await.unwrap();
	let message = broadcast.message();
	assert_eq!(message.method, "message");
	assert_eq!(message.params["sid"], "0xsession42");
	assert_eq!(message.params["type"], "rfq");
	assert_eq!(message.params["amountIn"], "1500000");
	match &broadcast {
		RelayFrame::Request { signatures, .. } => assert_eq!(signatures.len(), 1),
		_ => panic!("broadcast should be a request frame"),
	}

	// An agent quote pushed by the relay reaches the handler.
	let quote = json!({
		"req": [501, "message", {
			"type": "quote",
			"intentId": 7,
			"agentAddress": "0x00000000000000000000000000000000000000cc",
			"agentName": "speedy",
			"outputAmount": "1100",
			"timestamp": 1u64,
		}, 0],
		"sig": ["0xagent"],
	});
	push.send(quote.to_string()).unwrap();

	let received: QuotePayload =
		tokio::time::timeout(Duration::from_secs(2), quote_rx.recv())
			.await
			.unwrap()
			.unwrap();
	assert_eq!(received.intent_id, 7);
	assert_eq!(received.output_amount, U256::from(1_100u64));

	channel.disconnect().await;
	assert_eq!(channel.state().await, ConnectionState::Disconnected);
	// Idempotent.
	channel.disconnect().await;
}

#[tokio::test]
async fn rejected_credential_fails_connect() {
	let (port, _seen, _push) = spawn_relay_stub(false).await;
	let channel = RelayChannel::new(test_config(port), test_account());

	let err = channel.connect().await.unwrap_err();
	assert!(matches!(err, ChannelError::Authentication(_)));
	assert_eq!(channel.state().await, ConnectionState::Disconnected);
}

#[tokio::test]
async fn silent_relay_times_out_the_handshake() {
	// A listener that accepts the socket but never speaks.
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let port = listener.local_addr().unwrap().port();
	tokio::spawn(async move {
		let (stream, _) = listener.accept().await.unwrap();
		let ws = accept_async(stream).await.unwrap();
		let (_sink, mut source) = ws.split();
		while let Some(Ok(_)) = source.next().await {}
	});

	let mut config = test_config(port);
	config.step_timeout = Duration::from_millis(200);
	let channel = RelayChannel::new(config, test_account());

	let err = channel.connect().await.unwrap_err();
	assert!(matches!(err, ChannelError::Authentication(_)));
}

#[tokio::test]
async fn send_message_requires_an_open_transport() {
	let channel = RelayChannel::new(test_config(1), test_account());
	let payload = MessagePayload::Winner(aggregator_types::WinnerPayload {
		intent_id: 1,
		winner_address: Address::ZERO,
		output_amount: U256::from(10u64),
	});

	let err = channel.send_message("0xs", &payload).await.unwrap_err();
	assert!(matches!(err, ChannelError::NotConnected));

	// Broadcast without a bound session is also rejected.
	let err = channel.broadcast(&payload).await.unwrap_err();
	assert!(matches!(err, ChannelError::NoSession));
}
