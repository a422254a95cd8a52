//! Deployment lifecycle state machine.

use serde::{Deserialize, Serialize};
use stevedore_core::{DeployError, DeployResult, Phase};

/// Where a deployment is in its lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing on the hosts, or a configure that did not finish
    #[default]
    Uninitialized,
    /// Directories, config and mount tables are in place
    Configured,
    /// Servers started and clients mounted (possibly degraded)
    Running,
    /// Processes stopped, storage still present
    Stopped,
    /// No server could be started
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Operation requested by a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Lay out directories, config and mount tables
    Configure,
    /// Start servers and mount clients
    Start,
    /// Unmount clients and kill servers
    Stop,
    /// Remove storage and client artifacts
    Clean,
    /// Stop then start
    Restart,
    /// Read-only health query
    Status,
}

impl Operation {
    /// Phase reported for this operation
    #[must_use]
    pub fn phase(self) -> Phase {
        match self {
            Self::Configure => Phase::Configure,
            Self::Start => Phase::Start,
            Self::Stop => Phase::Stop,
            Self::Clean => Phase::Clean,
            Self::Restart => Phase::Restart,
            Self::Status => Phase::Status,
        }
    }

    /// Whether the operation may run from `state`
    #[must_use]
    pub fn permitted_from(self, state: LifecycleState) -> bool {
        use LifecycleState::*;
        match self {
            Self::Configure => matches!(state, Uninitialized | Configured | Stopped | Failed),
            Self::Start => matches!(state, Configured | Stopped),
            Self::Stop => matches!(state, Configured | Running | Stopped | Failed),
            Self::Clean => matches!(state, Uninitialized | Stopped),
            Self::Restart => matches!(state, Running | Stopped | Configured),
            Self::Status => true,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.phase().fmt(f)
    }
}

impl LifecycleState {
    /// Check that `op` may run from this state
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` otherwise.
    pub fn check(self, op: Operation) -> DeployResult<()> {
        if op.permitted_from(self) {
            Ok(())
        } else {
            Err(DeployError::InvalidLifecycleTransition {
                operation: op.to_string(),
                state: self.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [LifecycleState; 5] = [
        LifecycleState::Uninitialized,
        LifecycleState::Configured,
        LifecycleState::Running,
        LifecycleState::Stopped,
        LifecycleState::Failed,
    ];

    #[test]
    fn test_clean_requires_stopped_or_uninitialized() {
        assert!(LifecycleState::Stopped.check(Operation::Clean).is_ok());
        assert!(LifecycleState::Uninitialized.check(Operation::Clean).is_ok());
        let err = LifecycleState::Running.check(Operation::Clean).unwrap_err();
        assert_eq!(
            err,
            DeployError::InvalidLifecycleTransition {
                operation: "clean".to_string(),
                state: "running".to_string(),
            }
        );
    }

    #[test]
    fn test_start_requires_configuration() {
        assert!(LifecycleState::Uninitialized.check(Operation::Start).is_err());
        assert!(LifecycleState::Running.check(Operation::Start).is_err());
        assert!(LifecycleState::Failed.check(Operation::Start).is_err());
        assert!(LifecycleState::Configured.check(Operation::Start).is_ok());
        assert!(LifecycleState::Stopped.check(Operation::Start).is_ok());
    }

    #[test]
    fn test_failed_allows_recovery() {
        assert!(LifecycleState::Failed.check(Operation::Stop).is_ok());
        assert!(LifecycleState::Failed.check(Operation::Configure).is_ok());
        assert!(LifecycleState::Failed.check(Operation::Restart).is_err());
    }

    #[test]
    fn test_running_cannot_reconfigure() {
        assert!(LifecycleState::Running.check(Operation::Configure).is_err());
    }

    #[test]
    fn test_status_always_permitted() {
        for state in ALL {
            assert!(state.check(Operation::Status).is_ok());
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&LifecycleState::Uninitialized).unwrap();
        assert_eq!(json, "\"uninitialized\"");
    }
}
