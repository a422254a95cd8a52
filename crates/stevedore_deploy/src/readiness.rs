//! Bounded readiness polling.
//!
//! Replaces a fixed settle sleep after server start: each host is probed
//! with exponential backoff until it answers or the attempts run out.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stevedore_config::ClusterConfig;
use stevedore_core::{Command, HostId};
use stevedore_remote::{CommandOutput, RemoteCommandRunner};
use tracing::debug;

/// Phrase `pvfs2-ping` prints when the filesystem answers
pub const PING_OK: &str = "appears to be correctly configured";

/// Backoff bounds for readiness checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    /// First retry delay in milliseconds
    pub min_delay_ms: u64,
    /// Cap on the retry delay in milliseconds
    pub max_delay_ms: u64,
    /// Retries after the first probe
    pub max_retries: usize,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            min_delay_ms: 250,
            max_delay_ms: 5_000,
            max_retries: 8,
        }
    }
}

impl ReadinessPolicy {
    /// Single probe, no retries
    #[must_use]
    pub fn once() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            max_retries: 0,
        }
    }

    /// Set first retry delay
    #[must_use]
    pub fn with_min_delay(mut self, delay: Duration) -> Self {
        self.min_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set delay cap
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set retry count
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// Backoff schedule
    #[must_use]
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms.max(self.min_delay_ms)))
            .with_max_times(self.max_retries)
    }
}

/// A readiness check run on one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Check command
    pub command: Command,
    /// Text stdout must contain, if any; otherwise a zero exit suffices
    pub expect: Option<String>,
}

impl Probe {
    /// Server process is running
    #[must_use]
    pub fn server() -> Self {
        Self {
            command: Command::new("pgrep").arg("-x").arg("pvfs2-server"),
            expect: None,
        }
    }

    /// Filesystem answers through the client's mount table
    #[must_use]
    pub fn client(config: &ClusterConfig) -> Self {
        let mut command = Command::new(config.binaries.ping());
        if let Some(lib) = config.binaries.library_dir() {
            command = command.env("LD_LIBRARY_PATH", lib);
        }
        Self {
            command: command
                .env("PVFS2TAB_FILE", config.paths.mount_table.to_string_lossy())
                .arg("-m")
                .arg_path(&config.paths.mount_point),
            expect: Some(PING_OK.to_string()),
        }
    }

    /// Judge one probe output
    ///
    /// # Errors
    ///
    /// Returns the reason the host is not ready.
    pub fn evaluate(&self, output: &CommandOutput) -> Result<(), String> {
        if !output.success() {
            return Err(output.describe());
        }
        match &self.expect {
            Some(text) if !output.stdout.contains(text.as_str()) => {
                Err(format!("output did not contain {text:?}"))
            }
            _ => Ok(()),
        }
    }

    /// Run the probe on `host` until it passes or `policy` gives up
    ///
    /// # Errors
    ///
    /// Returns the last failure reason.
    pub async fn wait(
        &self,
        runner: &dyn RemoteCommandRunner,
        host: &HostId,
        policy: &ReadinessPolicy,
    ) -> Result<(), String> {
        let attempt = move || async move {
            let output = runner
                .run_one(host, &self.command)
                .await
                .map_err(|e| e.to_string())?;
            self.evaluate(&output)
        };
        attempt
            .retry(policy.backoff())
            .notify(|reason: &String, delay: Duration| {
                debug!(host = %host, reason = %reason, delay_ms = delay.as_millis() as u64, "not ready yet");
            })
            .await
    }
}
