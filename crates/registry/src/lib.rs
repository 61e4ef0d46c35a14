//! Per-owner file registry.
//!
//! [`FileRegistry`] is the authoritative owner -> ordered records mapping.
//! [`LocalRegistryRuntime`] wraps it as an authenticated transaction runtime:
//! every mutating call carries a wallet-signed [`AuthorizationProof`] and the
//! proof's owner is the caller the registry enforces access control against.
//!
//! [`AuthorizationProof`]: filechain_auth::AuthorizationProof

pub mod errors;
pub mod registry;
pub mod runtime;
pub mod snapshot;

pub use errors::*;
pub use registry::FileRegistry;
pub use runtime::{CallReceipt, LocalRegistryRuntime, RegistryAction, RegistryCall, RegistryRuntime};
pub use snapshot::{OwnerCollection, RegistrySnapshot};
