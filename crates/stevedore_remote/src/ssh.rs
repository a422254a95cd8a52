//! OpenSSH transport.

use crate::runner::{CommandOutput, RemoteCommandRunner, TransportError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stevedore_core::{Command, HostId};
use tokio::sync::Semaphore;
use tracing::debug;

/// Exit status OpenSSH reserves for its own connection errors
const SSH_CONNECT_FAILURE: i32 = 255;

/// SSH transport settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// ssh executable
    pub ssh_program: String,
    /// scp executable
    pub scp_program: String,
    /// Remote login name (default: ssh's own default)
    pub user: Option<String>,
    /// `-o` options passed to both ssh and scp
    pub options: Vec<String>,
    /// Per-process time limit
    pub timeout: Duration,
    /// Maximum concurrent processes
    pub max_parallel: usize,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            user: None,
            options: vec![
                "BatchMode=yes".to_string(),
                "StrictHostKeyChecking=no".to_string(),
            ],
            timeout: Duration::from_secs(60),
            max_parallel: 32,
        }
    }
}

impl SshConfig {
    /// Set remote user
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Append an `-o` option
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Set per-process time limit
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set maximum concurrent processes (at least one)
    #[must_use]
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }
}

/// Runs commands through the system `ssh` and `scp` binaries
///
/// Each command is rendered to a single quoted shell string and handed to
/// the remote login shell. Processes are bounded by a semaphore and killed
/// when they exceed the configured timeout.
#[derive(Debug, Clone)]
pub struct SshRunner {
    config: SshConfig,
    permits: Arc<Semaphore>,
}

impl SshRunner {
    /// Create a runner
    #[must_use]
    pub fn new(config: SshConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        Self { config, permits }
    }

    fn ssh_command(&self, host: &HostId, command: &Command) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.config.ssh_program);
        for option in &self.config.options {
            cmd.arg("-o").arg(option);
        }
        if let Some(user) = &self.config.user {
            cmd.arg("-l").arg(user);
        }
        cmd.arg(host.as_str()).arg(command.to_string());
        cmd
    }

    fn scp_command(&self, host: &HostId, local: &Path, remote: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.config.scp_program);
        cmd.arg("-q");
        for option in &self.config.options {
            cmd.arg("-o").arg(option);
        }
        cmd.arg(local).arg(scp_destination(self.config.user.as_deref(), host, remote));
        cmd
    }

    async fn execute(
        &self,
        target: &str,
        program: &str,
        mut cmd: tokio::process::Command,
    ) -> Result<CommandOutput, TransportError> {
        let _permit = self.permits.acquire().await.map_err(|_| TransportError::Spawn {
            program: program.to_string(),
            reason: "runner is shut down".to_string(),
        })?;

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let child = cmd.spawn().map_err(|e| TransportError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => CommandOutput::from(output),
            Ok(Err(e)) => {
                return Err(TransportError::Spawn {
                    program: program.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(TransportError::Timeout {
                    target: target.to_string(),
                    after: self.config.timeout,
                });
            }
        };

        debug!(
            target_host = %target,
            exit_code = output.exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "process exited"
        );
        Ok(output)
    }
}

#[async_trait]
impl RemoteCommandRunner for SshRunner {
    async fn run_one(&self, host: &HostId, command: &Command) -> Result<CommandOutput, TransportError> {
        debug!(host = %host, command = %command, "running remote command");
        let output = self
            .execute(host.as_str(), &self.config.ssh_program, self.ssh_command(host, command))
            .await?;
        if output.exit_code == SSH_CONNECT_FAILURE {
            return Err(TransportError::Unreachable {
                host: host.clone(),
                reason: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    async fn copy_file(&self, host: &HostId, local: &Path, remote: &Path) -> Result<(), TransportError> {
        debug!(host = %host, local = %local.display(), remote = %remote.display(), "copying file");
        let output = self
            .execute(host.as_str(), &self.config.scp_program, self.scp_command(host, local, remote))
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(TransportError::CopyFailed {
                host: host.clone(),
                reason: output.describe(),
            })
        }
    }

    async fn run_local(&self, command: &Command) -> Result<CommandOutput, TransportError> {
        debug!(command = %command, "running local command");
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command.to_string());
        self.execute("local", "sh", cmd).await
    }
}

fn scp_destination(user: Option<&str>, host: &HostId, remote: &Path) -> String {
    let host = if host.as_ip().is_some_and(|ip| ip.is_ipv6()) {
        format!("[{host}]")
    } else {
        host.to_string()
    };
    match user {
        Some(user) => format!("{user}@{host}:{}", remote.display()),
        None => format!("{host}:{}", remote.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> HostId {
        HostId::parse(name).unwrap()
    }

    #[test]
    fn test_ssh_command_line() {
        let runner = SshRunner::new(SshConfig::default().with_user("ofs"));
        let cmd = runner.ssh_command(&host("h1"), &Command::new("mkdir").arg("-p").arg("/tmp/a b"));
        let std = cmd.as_std();
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(std.get_program(), "ssh");
        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=no",
                "-l",
                "ofs",
                "h1",
                "mkdir -p '/tmp/a b'",
            ]
        );
    }

    #[test]
    fn test_scp_destination() {
        let remote = Path::new("/tmp/ofs/orangefs.conf");
        assert_eq!(scp_destination(None, &host("h1"), remote), "h1:/tmp/ofs/orangefs.conf");
        assert_eq!(
            scp_destination(Some("ofs"), &host("fe80::1"), remote),
            "ofs@[fe80::1]:/tmp/ofs/orangefs.conf"
        );
    }

    #[test]
    fn test_max_parallel_floor() {
        let config = SshConfig::default().with_max_parallel(0);
        assert_eq!(config.max_parallel, 1);
    }

    #[tokio::test]
    async fn test_run_local_captures_output() {
        let runner = SshRunner::new(SshConfig::default());
        let output = runner
            .run_local(&Command::new("printf").arg("%s").arg("ready"))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "ready");
    }

    #[tokio::test]
    async fn test_run_local_redirect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let runner = SshRunner::new(SshConfig::default());
        runner
            .run_local(&Command::new("printf").arg("%s\\n").arg("line").stdout_to(&path))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "line\n");
    }

    #[tokio::test]
    async fn test_run_local_timeout() {
        let runner = SshRunner::new(SshConfig::default().with_timeout(Duration::from_millis(50)));
        let err = runner
            .run_local(&Command::new("sleep").arg("5"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { ref target, .. } if target == "local"));
    }
}
