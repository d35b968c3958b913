use alloy_consensus::TxLegacy;
use alloy_primitives::{Address, PrimitiveSignature, B256};
use async_trait::async_trait;
use thiserror::Error;

pub mod implementations;

pub use implementations::local::LocalWallet;

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

/// Signing operations the aggregator needs from its identity key.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// The ledger address of this identity.
	fn address(&self) -> Address;
	/// Signs an EIP-191 personal message.
	async fn sign_message(&self, message: &[u8]) -> Result<PrimitiveSignature, AccountError>;
	/// Signs a precomputed 32-byte digest (EIP-712 signing hashes).
	async fn sign_hash(&self, hash: &B256) -> Result<PrimitiveSignature, AccountError>;
	/// Signs a legacy transaction in place.
	async fn sign_transaction(&self, tx: &mut TxLegacy)
		-> Result<PrimitiveSignature, AccountError>;
}

/// Thin service wrapper around the configured account provider.
pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub fn address(&self) -> Address {
		self.provider.address()
	}

	pub async fn sign_message(&self, message: &[u8]) -> Result<PrimitiveSignature, AccountError> {
		self.provider.sign_message(message).await
	}

	pub async fn sign_hash(&self, hash: &B256) -> Result<PrimitiveSignature, AccountError> {
		self.provider.sign_hash(hash).await
	}

	pub async fn sign_transaction(
		&self,
		tx: &mut TxLegacy,
	) -> Result<PrimitiveSignature, AccountError> {
		self.provider.sign_transaction(tx).await
	}
}
