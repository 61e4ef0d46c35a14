//! Error types for wallet authorization

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("challenge was not issued by this verifier or has already been used")]
    UnknownChallenge,

    #[error("challenge expired at {expires_at} (now {now})")]
    ChallengeExpired { expires_at: u64, now: u64 },

    #[error("presented challenge does not match the issued challenge")]
    ChallengeMismatch,

    #[error("challenge is bound to {expected}, proof claims {claimed}")]
    OwnerMismatch { expected: String, claimed: String },

    #[error("challenge issued for {expected}, presented for {actual}")]
    PurposeMismatch { expected: String, actual: String },

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signature does not verify against the claimed public key")]
    InvalidSignature,

    #[error("invalid authorization transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("wallet signer failed: {0}")]
    Signer(String),

    #[error("key file error: {0}")]
    KeyFile(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
