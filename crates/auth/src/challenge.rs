//! Challenge issuance and verification.

use crate::errors::*;
use crate::proof::{AuthorizationProof, VerifiedAuthorization};
use filechain_types::{OwnerId, SystemTimeSource, TimeSource};
use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default lifetime of an issued challenge.
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 300;

const CHALLENGE_PREAMBLE: &str =
    "Please sign this message to prove you are owner of this account: ";

/// Downstream action a challenge may authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPurpose {
    /// Fetching a decryption key from the off-chain store.
    KeyAccess,
    /// One mutating call against the registry.
    RegistryWrite,
}

impl AuthPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPurpose::KeyAccess => "key-access",
            AuthPurpose::RegistryWrite => "registry-write",
        }
    }
}

impl fmt::Display for AuthPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-owner-bound message issued by a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub nonce: [u8; 32],
    pub owner: OwnerId,
    pub purpose: AuthPurpose,
    pub issued_at: u64,
    pub expires_at: u64,
}

impl Challenge {
    /// Exact bytes the wallet must sign.
    pub fn message(&self) -> Vec<u8> {
        format!(
            "{CHALLENGE_PREAMBLE}{}\npurpose: {}\nnonce: {}\nissued: {}\nexpires: {}",
            self.owner.to_address(),
            self.purpose,
            hex::encode(self.nonce),
            self.issued_at,
            self.expires_at
        )
        .into_bytes()
    }

    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce)
    }
}

/// Issues challenges and verifies the proofs answering them.
///
/// Held by every verifying party. Outstanding nonces are kept in memory
/// only; a nonce is forgotten the first time it is presented, whether or not
/// the proof verifies.
pub struct ChallengeIssuer {
    outstanding: Mutex<HashMap<[u8; 32], Challenge>>,
    ttl_secs: u64,
    clock: Arc<dyn TimeSource>,
}

impl ChallengeIssuer {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_CHALLENGE_TTL_SECS, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(ttl_secs: u64, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            outstanding: Mutex::new(HashMap::new()),
            ttl_secs,
            clock,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Issue a fresh challenge bound to `owner` for `purpose`.
    pub fn issue(&self, owner: OwnerId, purpose: AuthPurpose) -> Challenge {
        let now = self.clock.now_secs();
        let mut nonce = [0u8; 32];
        OsRng.fill_bytes(&mut nonce);

        let challenge = Challenge {
            nonce,
            owner,
            purpose,
            issued_at: now,
            expires_at: now.saturating_add(self.ttl_secs),
        };

        let mut outstanding = self.outstanding.lock();
        outstanding.retain(|_, c| c.expires_at >= now);
        outstanding.insert(nonce, challenge.clone());

        debug!(owner = %owner, %purpose, nonce = %challenge.nonce_hex(), "issued challenge");
        challenge
    }

    /// Verify a proof, consuming its challenge.
    pub fn verify(
        &self,
        proof: &AuthorizationProof,
        purpose: AuthPurpose,
    ) -> Result<VerifiedAuthorization> {
        let result = self.check(proof, purpose);
        match &result {
            Ok(_) => debug!(owner = %proof.owner, %purpose, "authorization verified"),
            Err(e) => warn!(owner = %proof.owner, %purpose, error = %e, "authorization rejected"),
        }
        result
    }

    fn check(
        &self,
        proof: &AuthorizationProof,
        purpose: AuthPurpose,
    ) -> Result<VerifiedAuthorization> {
        let issued = self
            .outstanding
            .lock()
            .remove(&proof.challenge.nonce)
            .ok_or(AuthError::UnknownChallenge)?;

        if issued != proof.challenge {
            return Err(AuthError::ChallengeMismatch);
        }

        if proof.owner != issued.owner {
            return Err(AuthError::OwnerMismatch {
                expected: issued.owner.to_address(),
                claimed: proof.owner.to_address(),
            });
        }

        if issued.purpose != purpose {
            return Err(AuthError::PurposeMismatch {
                expected: issued.purpose.to_string(),
                actual: purpose.to_string(),
            });
        }

        let now = self.clock.now_secs();
        if now > issued.expires_at {
            return Err(AuthError::ChallengeExpired {
                expires_at: issued.expires_at,
                now,
            });
        }

        proof.verify_signature()?;

        Ok(VerifiedAuthorization::new(issued.owner, purpose, issued.nonce))
    }

    /// Number of challenges issued and not yet presented or pruned.
    pub fn outstanding(&self) -> usize {
        self.outstanding.lock().len()
    }
}

impl Default for ChallengeIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChallengeIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChallengeIssuer")
            .field("outstanding", &self.outstanding())
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}
