//! Wallet signer interface and a local ed25519 implementation.

use crate::errors::*;
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey};
use filechain_types::OwnerId;
use rand_core::{OsRng, RngCore};
use std::fmt;

/// Signs arbitrary messages on behalf of one owner identity.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Public key controlled by this signer.
    fn address(&self) -> OwnerId;

    /// Sign the exact bytes given.
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>>;
}

/// In-process wallet holding an ed25519 signing key.
#[derive(Clone)]
pub struct LocalWallet {
    signing_key: SigningKey,
}

impl LocalWallet {
    /// Generate a new random wallet.
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::from_secret(secret)
    }

    pub fn from_secret(secret: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&secret),
        }
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> OwnerId {
        OwnerId::new(self.signing_key.verifying_key().to_bytes())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>> {
        Ok(self.signing_key.sign(message).to_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};

    #[tokio::test]
    async fn signatures_verify_under_address() {
        let wallet = LocalWallet::generate();
        let signature = wallet.sign_message(b"hello").await.unwrap();

        let key = VerifyingKey::from_bytes(wallet.address().as_bytes()).unwrap();
        let signature = Signature::from_slice(&signature).unwrap();
        assert!(key.verify(b"hello", &signature).is_ok());
    }

    #[test]
    fn same_secret_same_address() {
        let a = LocalWallet::from_secret([1u8; 32]);
        let b = LocalWallet::from_secret([1u8; 32]);
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), LocalWallet::from_secret([2u8; 32]).address());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let wallet = LocalWallet::from_secret([0xAAu8; 32]);
        let rendered = format!("{wallet:?}");
        assert!(!rendered.contains(&hex::encode([0xAAu8; 32])));
    }
}
