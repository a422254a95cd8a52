//! Deployment error taxonomy.

use crate::host::HostId;
use crate::report::Phase;
use serde::{Deserialize, Serialize};

/// Result type used across stevedore crates
pub type DeployResult<T> = Result<T, DeployError>;

/// Deployment error type
///
/// Configuration-time variants abort a phase before any remote mutation.
/// Per-host variants are normally collected into a
/// [`PhaseReport`](crate::report::PhaseReport) instead of being raised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployError {
    /// Host list is empty, malformed or unreadable
    #[error("Invalid host source: {reason}")]
    InvalidHostSource {
        /// Why the source was rejected
        reason: String,
    },

    /// More hosts requested than the pool holds
    #[error("Insufficient hosts: requested {requested}, available {available}")]
    InsufficientHosts {
        /// Requested host count
        requested: usize,
        /// Hosts in the pool
        available: usize,
    },

    /// Host name lookup failed
    #[error("Failed to resolve {host}: {reason}")]
    ResolutionError {
        /// Host being resolved
        host: HostId,
        /// Resolver message
        reason: String,
    },

    /// Network protocol outside the supported set
    #[error("Unsupported protocol: {0} (expected tcp or infiniband)")]
    UnsupportedProtocol(String),

    /// Cluster parameter failed validation
    #[error("Invalid parameter {field}: {reason}")]
    InvalidParameter {
        /// Parameter name
        field: String,
        /// Why it was rejected
        reason: String,
    },

    /// Operation not permitted in the current lifecycle state
    #[error("Cannot {operation} a deployment in state {state}")]
    InvalidLifecycleTransition {
        /// Requested operation
        operation: String,
        /// Current lifecycle state
        state: String,
    },

    /// A remote command failed on one host
    #[error("{phase} failed on {host}: {reason}")]
    RemoteCommandFailure {
        /// Host the command ran on
        host: HostId,
        /// Phase issuing the command
        phase: Phase,
        /// Exit status or transport message
        reason: String,
    },

    /// A command on the orchestrating machine failed
    #[error("Local command `{command}` failed: {reason}")]
    LocalCommandFailure {
        /// Rendered command line
        command: String,
        /// Exit status or spawn error
        reason: String,
    },

    /// The cluster config could not be copied to a host
    #[error("Config distribution to {host} failed: {reason}")]
    ConfigDistributionFailure {
        /// Target host
        host: HostId,
        /// Transport message
        reason: String,
    },

    /// A host did not pass verification
    #[error("Verification failed on {host}: {reason}")]
    VerificationFailure {
        /// Host that failed verification
        host: HostId,
        /// Check output
        reason: String,
    },

    /// A server process survived stop
    #[error("Server process still running on {host}: {detail}")]
    LingeringProcess {
        /// Host still listing the process
        host: HostId,
        /// Process listing
        detail: String,
    },

    /// Some but not all hosts in a batch failed
    #[error("{phase} partially failed on {} host(s): {}", failed.len(), join_hosts(failed))]
    PartialClusterFailure {
        /// Phase that was running
        phase: Phase,
        /// Hosts that failed
        failed: Vec<HostId>,
    },

    /// No host in a batch succeeded
    #[error("{phase} failed on every host")]
    AllHostsFailed {
        /// Phase that was running
        phase: Phase,
    },

    /// No persisted deployment with this name
    #[error("Deployment not found: {name}")]
    DeploymentNotFound {
        /// Deployment name
        name: String,
    },

    /// Reading or writing persisted state failed
    #[error("State error: {reason}")]
    State {
        /// Underlying I/O or encoding message
        reason: String,
    },
}

impl DeployError {
    /// Whether this error aborts the phase that produced it
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::VerificationFailure { .. } | Self::LingeringProcess { .. }
        )
    }

    /// Host this error is attributed to, if any
    #[must_use]
    pub fn host(&self) -> Option<&HostId> {
        match self {
            Self::ResolutionError { host, .. }
            | Self::RemoteCommandFailure { host, .. }
            | Self::ConfigDistributionFailure { host, .. }
            | Self::VerificationFailure { host, .. }
            | Self::LingeringProcess { host, .. } => Some(host),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        Self::State {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        Self::State {
            reason: err.to_string(),
        }
    }
}

fn join_hosts(hosts: &[HostId]) -> String {
    hosts
        .iter()
        .map(HostId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
