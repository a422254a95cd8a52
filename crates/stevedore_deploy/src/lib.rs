//! STEVEDORE Deploy
//!
//! Drives a parallel filesystem deployment through
//! configure → start → stop → clean, persisting what configure decided so
//! every later phase acts on exactly the same topology.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lifecycle;
pub mod orchestrator;
pub mod readiness;
pub mod state;

pub use lifecycle::{LifecycleState, Operation};
pub use orchestrator::{
    ClientStatus, ConfigureRequest, Orchestrator, OrchestratorOptions, Snapshot, StatusReport,
};
pub use readiness::{Probe, ReadinessPolicy};
pub use state::{DeploymentState, LifecycleRecord, StateStore};
