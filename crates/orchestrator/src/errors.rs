//! Errors surfaced by orchestrated flows

use crate::outcome::FlowOutcome;
use crate::progress::FlowStep;
use filechain_auth::AuthError;
use filechain_registry::RegistryError;
use filechain_store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Caller-facing failure categories. Every collaborator error is folded into
/// one of these at the orchestrator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateCid,
    NotFound,
    AuthorizationRejected,
    CollaboratorUnavailable,
    OwnerMismatch,
}

impl ErrorKind {
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorKind::DuplicateCid | ErrorKind::NotFound)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::DuplicateCid => "duplicate cid",
            ErrorKind::NotFound => "not found",
            ErrorKind::AuthorizationRejected => "authorization rejected",
            ErrorKind::CollaboratorUnavailable => "collaborator unavailable",
            ErrorKind::OwnerMismatch => "owner mismatch",
        };
        f.write_str(label)
    }
}

impl From<&StoreError> for ErrorKind {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::InvalidApiKey
            | StoreError::AccessDenied(_)
            | StoreError::Unauthorized(_) => ErrorKind::AuthorizationRejected,
            StoreError::Crypto(_)
            | StoreError::Unavailable(_)
            | StoreError::Io(_)
            | StoreError::Serialization(_) => ErrorKind::CollaboratorUnavailable,
        }
    }
}

impl From<&RegistryError> for ErrorKind {
    fn from(err: &RegistryError) -> Self {
        match err {
            RegistryError::DuplicateCid { .. } => ErrorKind::DuplicateCid,
            RegistryError::NotFound { .. } => ErrorKind::NotFound,
            RegistryError::OwnerMismatch { .. } => ErrorKind::OwnerMismatch,
            RegistryError::Unauthorized(_) => ErrorKind::AuthorizationRejected,
            RegistryError::Unavailable(_) | RegistryError::Persistence(_) => {
                ErrorKind::CollaboratorUnavailable
            }
        }
    }
}

impl From<&AuthError> for ErrorKind {
    fn from(_: &AuthError) -> Self {
        ErrorKind::AuthorizationRejected
    }
}

/// A flow that aborted, tagged with the step it was attempting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {step}: {message}")]
pub struct FlowError {
    pub kind: ErrorKind,
    pub step: FlowStep,
    pub message: String,
}

impl FlowError {
    pub fn new(kind: ErrorKind, step: FlowStep, message: impl Into<String>) -> Self {
        Self {
            kind,
            step,
            message: message.into(),
        }
    }

    pub fn store(step: FlowStep, err: StoreError) -> Self {
        Self::new(ErrorKind::from(&err), step, err.to_string())
    }

    pub fn registry(step: FlowStep, err: RegistryError) -> Self {
        Self::new(ErrorKind::from(&err), step, err.to_string())
    }

    pub fn auth(step: FlowStep, err: AuthError) -> Self {
        Self::new(ErrorKind::from(&err), step, err.to_string())
    }

    /// Terminal state of the aborted flow. Aborts never leave a cross-layer
    /// effect behind, so they are either a no-op or a rejection.
    pub fn outcome(&self) -> FlowOutcome {
        if self.kind.is_recoverable() {
            FlowOutcome::RecoverableNoOp
        } else {
            FlowOutcome::Rejected
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_taxonomy() {
        let cid = "Qm1".to_string();
        assert_eq!(
            ErrorKind::from(&RegistryError::DuplicateCid { cid: cid.clone() }),
            ErrorKind::DuplicateCid
        );
        assert_eq!(
            ErrorKind::from(&RegistryError::NotFound { cid }),
            ErrorKind::NotFound
        );
        assert_eq!(
            ErrorKind::from(&RegistryError::OwnerMismatch {
                caller: "fa".into(),
                owner: "fb".into(),
            }),
            ErrorKind::OwnerMismatch
        );
        assert_eq!(
            ErrorKind::from(&RegistryError::Unavailable("down".into())),
            ErrorKind::CollaboratorUnavailable
        );
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(
            ErrorKind::from(&StoreError::InvalidApiKey),
            ErrorKind::AuthorizationRejected
        );
        assert_eq!(
            ErrorKind::from(&StoreError::Unauthorized(AuthError::InvalidSignature)),
            ErrorKind::AuthorizationRejected
        );
        assert_eq!(
            ErrorKind::from(&StoreError::Unavailable("timeout".into())),
            ErrorKind::CollaboratorUnavailable
        );
    }

    #[test]
    fn aborted_flow_outcomes() {
        let not_found = FlowError::new(ErrorKind::NotFound, FlowStep::Located, "gone");
        assert_eq!(not_found.outcome(), FlowOutcome::RecoverableNoOp);

        let rejected = FlowError::auth(FlowStep::Authorized, AuthError::InvalidSignature);
        assert_eq!(rejected.kind, ErrorKind::AuthorizationRejected);
        assert_eq!(rejected.outcome(), FlowOutcome::Rejected);
    }
}
