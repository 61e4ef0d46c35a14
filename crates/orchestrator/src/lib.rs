//! Dual-write orchestration.
//!
//! The [`Orchestrator`] sequences calls to the off-chain [`ObjectStore`] and
//! the on-chain [`RegistryRuntime`] as explicit sagas. Nothing is rolled back
//! automatically: a flow that leaves the two layers disagreeing ends in
//! [`FlowOutcome::PartialInconsistency`] with a report naming what was left
//! behind.
//!
//! [`ObjectStore`]: filechain_store::ObjectStore
//! [`RegistryRuntime`]: filechain_registry::RegistryRuntime

pub mod errors;
pub mod orchestrator;
pub mod outcome;
pub mod progress;

pub use errors::*;
pub use orchestrator::Orchestrator;
pub use outcome::*;
pub use progress::{Flow, FlowStep, Progress, ProgressSink};
