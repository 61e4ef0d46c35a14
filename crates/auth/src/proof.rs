//! Stateless authorization proof values.

use crate::challenge::{AuthPurpose, Challenge};
use crate::errors::*;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use filechain_types::OwnerId;
use serde::{Deserialize, Serialize};

const SIGNATURE_LENGTH: usize = 64;

/// `{publicKey, challenge, signature}` carried to the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationProof {
    pub owner: OwnerId,
    pub challenge: Challenge,
    pub signature: Vec<u8>,
}

impl AuthorizationProof {
    pub fn new(owner: OwnerId, challenge: Challenge, signature: Vec<u8>) -> Self {
        Self {
            owner,
            challenge,
            signature,
        }
    }

    /// Check that the signature covers the unmodified challenge and verifies
    /// under the claimed key. Does not consume anything.
    pub fn verify_signature(&self) -> Result<()> {
        if self.owner != self.challenge.owner {
            return Err(AuthError::OwnerMismatch {
                expected: self.challenge.owner.to_address(),
                claimed: self.owner.to_address(),
            });
        }

        if self.signature.len() != SIGNATURE_LENGTH {
            return Err(AuthError::MalformedSignature(format!(
                "expected {SIGNATURE_LENGTH} bytes, got {}",
                self.signature.len()
            )));
        }

        let verifying_key = VerifyingKey::from_bytes(self.owner.as_bytes())
            .map_err(|e| AuthError::MalformedSignature(format!("invalid public key: {e}")))?;

        let signature = Signature::from_slice(&self.signature)
            .map_err(|e| AuthError::MalformedSignature(e.to_string()))?;

        verifying_key
            .verify(&self.challenge.message(), &signature)
            .map_err(|_| AuthError::InvalidSignature)
    }
}

/// Successful verification result.
///
/// Deliberately neither `Clone` nor `Copy`: it is handed to the single action
/// it authorizes and dropped there.
#[derive(Debug, PartialEq, Eq)]
pub struct VerifiedAuthorization {
    owner: OwnerId,
    purpose: AuthPurpose,
    nonce: [u8; 32],
}

impl VerifiedAuthorization {
    pub(crate) fn new(owner: OwnerId, purpose: AuthPurpose, nonce: [u8; 32]) -> Self {
        Self {
            owner,
            purpose,
            nonce,
        }
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn purpose(&self) -> AuthPurpose {
        self.purpose
    }

    pub fn nonce(&self) -> &[u8; 32] {
        &self.nonce
    }
}
