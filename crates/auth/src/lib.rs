//! Wallet challenge-response authorization.
//!
//! A verifying party (the off-chain store or the registry runtime) issues a
//! [`Challenge`] bound to an owner key. The owner's [`WalletSigner`] signs the
//! exact challenge bytes, producing an [`AuthorizationProof`]. The verifier
//! consumes the challenge on first presentation and, if everything checks
//! out, hands back a [`VerifiedAuthorization`] that authorizes exactly one
//! downstream action.

pub mod attempt;
pub mod challenge;
pub mod errors;
pub mod keyfile;
pub mod proof;
pub mod signer;

pub use attempt::{authorize, AuthState, AuthorizationAttempt};
pub use challenge::{AuthPurpose, Challenge, ChallengeIssuer, DEFAULT_CHALLENGE_TTL_SECS};
pub use errors::*;
pub use keyfile::KeyFile;
pub use proof::{AuthorizationProof, VerifiedAuthorization};
pub use signer::{LocalWallet, WalletSigner};
