//! Remote command runner contract.

use async_trait::async_trait;
use futures::future::join_all;
use indexmap::IndexMap;
use std::path::Path;
use std::time::Duration;
use stevedore_core::{Command, HostId, HostSet};

/// Captured result of one process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` when killed by a signal
    pub exit_code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output carrying `stdout`
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with `exit_code`
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Exit code is zero
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Short human-readable reason for a non-zero exit
    #[must_use]
    pub fn describe(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit code {}", self.exit_code)
        } else {
            format!("exit code {}: {}", self.exit_code, stderr)
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Transport-level failure, distinct from a command exiting non-zero
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Host could not be contacted
    #[error("{host} unreachable: {reason}")]
    Unreachable {
        /// Target host
        host: HostId,
        /// Transport message
        reason: String,
    },

    /// Process did not finish in time and was killed
    #[error("Command on {target} timed out after {after:?}")]
    Timeout {
        /// Host name, or `local`
        target: String,
        /// Configured limit
        after: Duration,
    },

    /// Local process could not be started
    #[error("Failed to spawn {program}: {reason}")]
    Spawn {
        /// Program being spawned
        program: String,
        /// OS error
        reason: String,
    },

    /// File copy failed
    #[error("Copy to {host} failed: {reason}")]
    CopyFailed {
        /// Target host
        host: HostId,
        /// Copy tool output
        reason: String,
    },
}

/// Per-host results keyed in the order the hosts were given
pub type HostResults<T> = IndexMap<HostId, Result<T, TransportError>>;

/// Result of running commands in order on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every command exited zero
    Completed(Vec<CommandOutput>),
    /// Command at `step` exited non-zero; later commands were not run
    NonZeroExit {
        /// Index of the failing command
        step: usize,
        /// Its output
        output: CommandOutput,
    },
    /// Command at `step` could not be run
    Transport {
        /// Index of the failing command
        step: usize,
        /// Transport error
        error: TransportError,
    },
}

impl SequenceOutcome {
    /// All commands succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Human-readable failure reason, `None` on success
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Completed(_) => None,
            Self::NonZeroExit { step, output } => {
                Some(format!("step {} failed with {}", step + 1, output.describe()))
            }
            Self::Transport { step, error } => Some(format!("step {}: {}", step + 1, error)),
        }
    }
}

/// Executes commands on hosts
///
/// Implementations must be safe to call concurrently. `run_one`, `copy_file`
/// and `run_local` are required; the batch operations default to issuing
/// the single-host operation for every host in parallel.
#[async_trait]
pub trait RemoteCommandRunner: Send + Sync {
    /// Run `command` on `host`
    async fn run_one(&self, host: &HostId, command: &Command) -> Result<CommandOutput, TransportError>;

    /// Copy the local file at `local` to `remote` on `host`
    async fn copy_file(&self, host: &HostId, local: &Path, remote: &Path) -> Result<(), TransportError>;

    /// Run `command` on the orchestrating machine
    async fn run_local(&self, command: &Command) -> Result<CommandOutput, TransportError>;

    /// Run `command` on every host in parallel
    async fn run_many(&self, hosts: &HostSet, command: &Command) -> HostResults<CommandOutput> {
        let runs = hosts.iter().map(|host| async move {
            let result = self.run_one(host, command).await;
            (host.clone(), result)
        });
        join_all(runs).await.into_iter().collect()
    }

    /// Copy `local` to `remote` on every host in parallel
    async fn copy_to(&self, hosts: &HostSet, local: &Path, remote: &Path) -> HostResults<()> {
        let copies = hosts.iter().map(|host| async move {
            let result = self.copy_file(host, local, remote).await;
            (host.clone(), result)
        });
        join_all(copies).await.into_iter().collect()
    }

    /// Run `commands` in order on `host`, stopping at the first failure
    async fn run_sequence(&self, host: &HostId, commands: &[Command]) -> SequenceOutcome {
        let mut outputs = Vec::with_capacity(commands.len());
        for (step, command) in commands.iter().enumerate() {
            match self.run_one(host, command).await {
                Ok(output) if output.success() => outputs.push(output),
                Ok(output) => return SequenceOutcome::NonZeroExit { step, output },
                Err(error) => return SequenceOutcome::Transport { step, error },
            }
        }
        SequenceOutcome::Completed(outputs)
    }
}
