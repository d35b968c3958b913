//! Account provider implementations.
//!
//! Currently a single implementation: a local private-key wallet built on
//! Alloy's signer, suitable for a single-operator aggregator deployment.

use crate::{AccountError, AccountInterface};
use alloy_consensus::TxLegacy;
use alloy_network::TxSigner;
use alloy_primitives::{Address, PrimitiveSignature, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;

/// Local wallet backed by an in-memory private key.
pub struct LocalWallet {
	signer: PrivateKeySigner,
}

impl LocalWallet {
	/// Creates a wallet from a hex-encoded private key, with or without a
	/// 0x prefix.
	pub fn new(private_key_hex: &str) -> Result<Self, AccountError> {
		let signer = private_key_hex
			.parse::<PrivateKeySigner>()
			.map_err(|e| AccountError::InvalidKey(format!("Invalid private key: {}", e)))?;

		Ok(Self { signer })
	}

	/// Creates a wallet with a freshly generated key, used for ephemeral
	/// session keys.
	pub fn random() -> Self {
		Self {
			signer: PrivateKeySigner::random(),
		}
	}
}

#[async_trait]
impl AccountInterface for LocalWallet {
	fn address(&self) -> Address {
		self.signer.address()
	}

	async fn sign_message(&self, message: &[u8]) -> Result<PrimitiveSignature, AccountError> {
		self.signer
			.sign_message(message)
			.await
			.map_err(|e| AccountError::SigningFailed(format!("Failed to sign message: {}", e)))
	}

	async fn sign_hash(&self, hash: &B256) -> Result<PrimitiveSignature, AccountError> {
		self.signer
			.sign_hash(hash)
			.await
			.map_err(|e| AccountError::SigningFailed(format!("Failed to sign hash: {}", e)))
	}

	async fn sign_transaction(
		&self,
		tx: &mut TxLegacy,
	) -> Result<PrimitiveSignature, AccountError> {
		TxSigner::sign_transaction(&self.signer, tx)
			.await
			.map_err(|e| AccountError::SigningFailed(format!("Failed to sign transaction: {}", e)))
	}
}
