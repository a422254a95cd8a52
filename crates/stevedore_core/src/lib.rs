//! STEVEDORE Core Types
//!
//! Pure types shared by every stevedore crate: host identifiers and ordered
//! host sets, role partitions, typed remote commands, and per-host phase
//! reports. Nothing here talks to the network except host name resolution,
//! which goes through the [`Resolver`] seam.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod host;
pub mod partition;
pub mod report;
pub mod resolve;

// Re-exports
pub use command::Command;
pub use error::{DeployError, DeployResult};
pub use host::{HostId, HostSet, HostSource};
pub use partition::{ClientRouteMap, PartitionSpec, RoleLayout, RolePartition};
pub use report::{HostOutcome, Phase, PhaseReport, PhaseStatus};
pub use resolve::{ResolvePolicy, Resolver, StaticResolver, SystemResolver};
