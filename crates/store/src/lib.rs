//! Off-chain encrypted object store.
//!
//! [`ObjectStore`] is the interface the orchestrator consumes. Blobs are
//! addressed by the [`ContentId`] of their plaintext and held encrypted;
//! decryption keys are released only against a verified wallet proof from an
//! owner on the object's access list.
//!
//! [`ContentId`]: filechain_types::ContentId

pub mod blobs;
pub mod cipher;
pub mod errors;
pub mod mime;
pub mod store;
pub mod types;
pub mod vault;

#[cfg(any(test, feature = "test-util"))]
pub mod faulty;

pub use blobs::{BlobBackend, DiskBlobs, MemoryBlobs};
pub use errors::*;
pub use store::ObjectStore;
pub use types::*;
pub use vault::{EncryptedStore, LocalObjectStore, MemoryObjectStore, DEFAULT_PAGE_SIZE};

#[cfg(any(test, feature = "test-util"))]
pub use faulty::{FaultyStore, StoreOp};
