//! Shared types for the filechain workspace.
//!
//! Owner identities, content identifiers and the registry's file records live
//! here so that the registry, the off-chain store and the orchestrator agree on
//! a single representation.

pub mod address;
pub mod content_id;
pub mod file_record;
pub mod time_service;

pub use address::*;
pub use content_id::*;
pub use file_record::*;
pub use time_service::*;
