//! STEVEDORE Config
//!
//! Turns a role partition and scalar cluster parameters into a
//! [`ClusterConfig`] document. Generation is pure: no I/O, no clocks, no
//! randomness. Writing the document to disk and distributing it are separate
//! orchestrator steps.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod generator;
pub mod layout;
pub mod params;
pub mod route;

pub use generator::{generate, ClusterConfig};
pub use layout::{storage_path, DeploymentPaths, StorageRole};
pub use params::{Binaries, ClusterParams, Protocol};
pub use route::RouteEntry;
