//! Error types for the file registry

use filechain_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("File already exists: {cid}")]
    DuplicateCid { cid: String },

    #[error("File not found: {cid}")]
    NotFound { cid: String },

    #[error("Caller {caller} may not modify files owned by {owner}")]
    OwnerMismatch { caller: String, owner: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Registry runtime unavailable: {0}")]
    Unavailable(String),

    #[error("Registry persistence error: {0}")]
    Persistence(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(value: serde_json::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(value: std::io::Error) -> Self {
        Self::Persistence(value.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
