//! STEVEDORE Remote
//!
//! The narrow contract the orchestrator uses to reach hosts, plus two
//! transports:
//! - [`SshRunner`] drives OpenSSH and scp through `tokio::process`
//! - [`SimRunner`] records calls against simulated hosts with scripted faults

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod runner;
pub mod sim;
pub mod ssh;

pub use runner::{CommandOutput, HostResults, RemoteCommandRunner, SequenceOutcome, TransportError};
pub use sim::{SimCall, SimRule, SimRunner};
pub use ssh::{SshConfig, SshRunner};
