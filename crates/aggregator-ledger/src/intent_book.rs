//! Intent book contract bindings and views.

use alloy_primitives::Address;
use alloy_rpc_types::Filter;
use alloy_sol_types::{sol, SolCall, SolEvent};
use async_trait::async_trait;
use std::sync::Arc;

use aggregator_types::{Intent, IntentStatus};

use crate::{
	IntentCreation, IntentLedger, LedgerClient, LedgerError, LedgerGateway, TokenMetadata,
};

// On-chain ABI of the intent book and the ERC-20 metadata surface.
sol! {
	/// Swap intent record as stored by the intent book contract.
	struct IntentRecord {
		uint256 intentId;
		address requester;
		address currency0;
		address currency1;
		bool zeroForOne;
		uint256 amountIn;
		uint256 minOutputAmount;
		uint256 deadline;
		uint8 status;
		address filledBy;
		uint256 outputAmount;
	}

	/// Event emitted when a requester creates a new swap intent.
	event IntentCreated(
		uint256 indexed intentId,
		address indexed requester,
		bool zeroForOne,
		uint256 amountIn,
		uint256 minOutputAmount,
		uint256 deadline
	);

	interface IIntentBook {
		function getIntent(uint256 intentId) external view returns (IntentRecord intent);
	}

	interface IERC20Metadata {
		function decimals() external view returns (uint8);
	}
}

/// Typed view over one deployed intent book contract.
pub struct IntentBook {
	ledger: Arc<LedgerClient>,
	address: Address,
}

impl IntentBook {
	pub fn new(ledger: Arc<LedgerClient>, address: Address) -> Self {
		Self { ledger, address }
	}

	pub fn address(&self) -> Address {
		self.address
	}
}

#[async_trait]
impl IntentLedger for IntentBook {
	async fn current_height(&self) -> Result<u64, LedgerError> {
		self.ledger.current_height().await
	}

	async fn intent_created(
		&self,
		from_height: u64,
		to_height: u64,
	) -> Result<Vec<IntentCreation>, LedgerError> {
		let filter = Filter::new()
			.address(self.address)
			.event_signature(IntentCreated::SIGNATURE_HASH)
			.from_block(from_height)
			.to_block(to_height);

		let logs = self.ledger.logs(&filter).await?;

		let mut events = Vec::with_capacity(logs.len());
		for log in logs {
			let decoded = IntentCreated::decode_log(&log.inner, true)
				.map_err(|e| LedgerError::Decode(format!("Bad IntentCreated log: {}", e)))?;
			events.push(IntentCreation {
				intent_id: decoded.intentId.to::<u64>(),
				requester: decoded.requester,
			});
		}

		Ok(events)
	}

	async fn fetch_intent(&self, intent_id: u64) -> Result<Intent, LedgerError> {
		let call = IIntentBook::getIntentCall {
			intentId: alloy_primitives::U256::from(intent_id),
		};

		let raw = self
			.ledger
			.call(self.address, call.abi_encode().into())
			.await?;

		let decoded = IIntentBook::getIntentCall::abi_decode_returns(&raw, true)
			.map_err(|e| LedgerError::Decode(format!("Bad getIntent return: {}", e)))?;

		intent_from_record(decoded.intent)
	}
}

#[async_trait]
impl TokenMetadata for IntentBook {
	async fn token_decimals(&self, token: Address) -> Result<u8, LedgerError> {
		let call = IERC20Metadata::decimalsCall {};

		let raw = self.ledger.call(token, call.abi_encode().into()).await?;

		let decoded = IERC20Metadata::decimalsCall::abi_decode_returns(&raw, true)
			.map_err(|e| LedgerError::Decode(format!("Bad decimals return: {}", e)))?;

		Ok(decoded._0)
	}
}

fn intent_from_record(record: IntentRecord) -> Result<Intent, LedgerError> {
	let status = IntentStatus::try_from(record.status)
		.map_err(|raw| LedgerError::Decode(format!("Unknown intent status {}", raw)))?;

	Ok(Intent {
		intent_id: record.intentId.to::<u64>(),
		requester: record.requester,
		currency0: record.currency0,
		currency1: record.currency1,
		zero_for_one: record.zeroForOne,
		amount_in: record.amountIn,
		min_output_amount: record.minOutputAmount,
		deadline: record.deadline.to::<u64>(),
		status,
		filled_by: record.filledBy,
		output_amount: record.outputAmount,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, U256};

	fn record(status: u8) -> IntentRecord {
		IntentRecord {
			intentId: U256::from(7u64),
			requester: address!("00000000000000000000000000000000000000aa"),
			currency0: address!("00000000000000000000000000000000000000bb"),
			currency1: address!("00000000000000000000000000000000000000cc"),
			zeroForOne: true,
			amountIn: U256::from(1_500_000u64),
			minOutputAmount: U256::from(1_000u64),
			deadline: U256::from(12_345u64),
			status,
			filledBy: Address::ZERO,
			outputAmount: U256::ZERO,
		}
	}

	#[test]
	fn maps_contract_record_to_intent() {
		let intent = intent_from_record(record(0)).unwrap();
		assert_eq!(intent.intent_id, 7);
		assert_eq!(intent.status, IntentStatus::Pending);
		assert!(intent.is_pending());

		let filled = intent_from_record(record(1)).unwrap();
		assert_eq!(filled.status, IntentStatus::Filled);
		assert!(!filled.is_pending());
	}

	#[test]
	fn rejects_unknown_status() {
		assert!(matches!(
			intent_from_record(record(9)),
			Err(LedgerError::Decode(_))
		));
	}

	#[test]
	fn event_signature_is_stable() {
		assert_eq!(
			IntentCreated::SIGNATURE,
			"IntentCreated(uint256,address,bool,uint256,uint256,uint256)"
		);
	}
}
