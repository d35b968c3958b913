//! JSON-RPC ledger client.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::{Filter, Log, TransactionRequest};
use alloy_transport_http::Http;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use aggregator_account::AccountService;

use crate::{LedgerError, LedgerGateway};

/// Ledger client bound to one RPC endpoint and one signing account.
///
/// Contract-specific views ([`crate::IntentBook`], the reputation
/// registry) are layered on top of this client.
pub struct LedgerClient {
	provider: RootProvider<Http<reqwest::Client>>,
	account: Arc<AccountService>,
	chain_id: u64,
}

impl LedgerClient {
	/// Connects to the RPC endpoint and records its chain id for
	/// transaction signing.
	pub async fn connect(
		rpc_url: &str,
		account: Arc<AccountService>,
	) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Rpc(format!("Invalid RPC URL: {}", e)))?;
		let provider = RootProvider::new_http(url);

		let chain_id = provider
			.get_chain_id()
			.await
			.map_err(|e| LedgerError::Rpc(format!("Failed to get chain id: {}", e)))?;

		Ok(Self {
			provider,
			account,
			chain_id,
		})
	}

	/// Address of the signing account.
	pub fn signer_address(&self) -> Address {
		self.account.address()
	}

	pub async fn current_height(&self) -> Result<u64, LedgerError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| LedgerError::Rpc(format!("Failed to get block number: {}", e)))
	}

	pub async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, LedgerError> {
		self.provider
			.get_logs(filter)
			.await
			.map_err(|e| LedgerError::Rpc(format!("Log query failed: {}", e)))
	}
}

#[async_trait]
impl LedgerGateway for LedgerClient {
	async fn call(&self, to: Address, calldata: Bytes) -> Result<Bytes, LedgerError> {
		let request = TransactionRequest::default().to(to).input(calldata.into());
		self.provider
			.call(&request)
			.await
			.map_err(|e| LedgerError::Rpc(format!("Contract call failed: {}", e)))
	}

	async fn submit_call(&self, to: Address, calldata: Bytes) -> Result<B256, LedgerError> {
		let from = self.account.address();

		let nonce = self
			.provider
			.get_transaction_count(from)
			.await
			.map_err(|e| LedgerError::Rpc(format!("Failed to get nonce: {}", e)))?;

		let gas_price = self
			.provider
			.get_gas_price()
			.await
			.map_err(|e| LedgerError::Rpc(format!("Failed to get gas price: {}", e)))?;

		let estimate_request = TransactionRequest::default()
			.from(from)
			.to(to)
			.input(calldata.clone().into());
		let gas_limit = self
			.provider
			.estimate_gas(&estimate_request)
			.await
			.map_err(|e| LedgerError::Rpc(format!("Gas estimation failed: {}", e)))?;

		let mut tx = TxLegacy {
			chain_id: Some(self.chain_id),
			nonce,
			gas_price,
			gas_limit,
			to: TxKind::Call(to),
			value: U256::ZERO,
			input: calldata,
		};

		let signature = self
			.account
			.sign_transaction(&mut tx)
			.await
			.map_err(|e| LedgerError::Signing(e.to_string()))?;

		let envelope = TxEnvelope::Legacy(tx.into_signed(signature));
		let encoded = envelope.encoded_2718();

		let pending = self
			.provider
			.send_raw_transaction(&encoded)
			.await
			.map_err(|e| LedgerError::Rpc(format!("Transaction submission failed: {}", e)))?;

		let receipt = pending
			.get_receipt()
			.await
			.map_err(|e| LedgerError::Rpc(format!("Failed to await receipt: {}", e)))?;

		debug!(
			tx_hash = %receipt.transaction_hash,
			block = receipt.block_number.unwrap_or_default(),
			"transaction included"
		);

		if !receipt.status() {
			return Err(LedgerError::TransactionReverted(receipt.transaction_hash));
		}

		Ok(receipt.transaction_hash)
	}
}
