//! Simulated hosts for deterministic orchestration tests.
//!
//! [`SimRunner`] never spawns a process. Every call is recorded, matched
//! against scripted [`SimRule`]s and applied to a small per-host file model
//! so tests can assert on what a phase left behind.

use crate::runner::{CommandOutput, RemoteCommandRunner, TransportError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use stevedore_core::{Command, HostId};
use tokio::sync::RwLock;

/// Scripted response for matching commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRule {
    /// Program name to match (basename)
    pub program: String,
    /// Restrict to one host (`None` matches every host)
    pub host: Option<HostId>,
    /// Require an argument containing this text
    pub arg_contains: Option<String>,
    /// Exit code to return
    pub exit_code: i32,
    /// Stdout to return
    pub stdout: String,
    /// Stderr to return
    pub stderr: String,
    /// Remaining matches before the rule expires (`None` never expires)
    pub remaining: Option<usize>,
}

impl SimRule {
    /// Rule matching every invocation of `program`, succeeding with no output
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            host: None,
            arg_contains: None,
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            remaining: None,
        }
    }

    /// Only match on `host`
    #[must_use]
    pub fn on_host(mut self, host: &HostId) -> Self {
        self.host = Some(host.clone());
        self
    }

    /// Only match when an argument contains `text`
    #[must_use]
    pub fn when_arg(mut self, text: impl Into<String>) -> Self {
        self.arg_contains = Some(text.into());
        self
    }

    /// Exit with `code`
    #[must_use]
    pub fn exit(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Print `stdout`
    #[must_use]
    pub fn stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Print `stderr`
    #[must_use]
    pub fn stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Expire after `n` matches
    #[must_use]
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n);
        self
    }

    fn matches(&self, host: Option<&HostId>, command: &Command) -> bool {
        if self.remaining == Some(0) {
            return false;
        }
        if let Some(want) = &self.host {
            if host != Some(want) {
                return false;
            }
        }
        if program_name(command.program()) != self.program {
            return false;
        }
        match &self.arg_contains {
            Some(text) => command.get_args().iter().any(|a| a.contains(text.as_str())),
            None => true,
        }
    }

    fn output(&self) -> CommandOutput {
        CommandOutput {
            exit_code: self.exit_code,
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
        }
    }
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCall {
    /// Target host, `None` for local commands
    pub host: Option<HostId>,
    /// Rendered command line, or `copy <local> <remote>`
    pub command: String,
    /// Program basename (`copy` for file copies)
    pub program: String,
    /// Whether the command was escalated
    pub privileged: bool,
    /// Environment passed to the command
    pub env: Vec<(String, String)>,
}

/// In-memory transport with scripted failures
#[derive(Debug, Default)]
pub struct SimRunner {
    unreachable: RwLock<HashSet<HostId>>,
    rules: RwLock<Vec<SimRule>>,
    calls: RwLock<Vec<SimCall>>,
    files: RwLock<HashMap<Option<HostId>, BTreeSet<String>>>,
}

impl SimRunner {
    /// Create a runner where every host is reachable and every command succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `host` unreachable from the start
    #[must_use]
    pub fn with_unreachable(mut self, host: &HostId) -> Self {
        self.unreachable.get_mut().insert(host.clone());
        self
    }

    /// Add a scripted rule
    #[must_use]
    pub fn with_rule(mut self, rule: SimRule) -> Self {
        self.rules.get_mut().push(rule);
        self
    }

    /// Change a host's reachability
    pub async fn set_unreachable(&self, host: &HostId, unreachable: bool) {
        let mut set = self.unreachable.write().await;
        if unreachable {
            set.insert(host.clone());
        } else {
            set.remove(host);
        }
    }

    /// Add a scripted rule; later rules take precedence
    pub async fn add_rule(&self, rule: SimRule) {
        self.rules.write().await.push(rule);
    }

    /// All recorded calls in order
    pub async fn calls(&self) -> Vec<SimCall> {
        self.calls.read().await.clone()
    }

    /// Number of recorded calls
    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Programs run on `host`, in order
    pub async fn programs_on(&self, host: &HostId) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.host.as_ref() == Some(host))
            .map(|c| c.program.clone())
            .collect()
    }

    /// Rendered commands run on `host`, in order
    pub async fn commands_on(&self, host: &HostId) -> Vec<String> {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.host.as_ref() == Some(host))
            .map(|c| c.command.clone())
            .collect()
    }

    /// Forget recorded calls, keeping files and rules
    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Whether `path` exists on `host` (`None` for the local machine)
    pub async fn exists(&self, host: Option<&HostId>, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.files
            .read()
            .await
            .get(&host.cloned())
            .is_some_and(|files| files.contains(&path))
    }

    /// Paths currently present on `host`
    pub async fn files_on(&self, host: Option<&HostId>) -> BTreeSet<String> {
        self.files
            .read()
            .await
            .get(&host.cloned())
            .cloned()
            .unwrap_or_default()
    }

    async fn record(&self, host: Option<&HostId>, rendered: String, command: &Command) {
        self.calls.write().await.push(SimCall {
            host: host.cloned(),
            command: rendered,
            program: program_name(command.program()).to_string(),
            privileged: command.is_privileged(),
            env: command.get_envs().to_vec(),
        });
    }

    async fn check_reachable(&self, host: &HostId) -> Result<(), TransportError> {
        if self.unreachable.read().await.contains(host) {
            return Err(TransportError::Unreachable {
                host: host.clone(),
                reason: "simulated host down".to_string(),
            });
        }
        Ok(())
    }

    async fn respond(&self, host: Option<&HostId>, command: &Command) -> CommandOutput {
        let mut rules = self.rules.write().await;
        let Some(rule) = rules.iter_mut().rev().find(|r| r.matches(host, command)) else {
            return CommandOutput::default();
        };
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        rule.output()
    }

    async fn apply_effects(&self, host: Option<&HostId>, command: &Command) {
        let mut files = self.files.write().await;
        let entry = files.entry(host.cloned()).or_default();
        let paths = command.get_args().iter().filter(|a| !a.starts_with('-'));
        match program_name(command.program()) {
            "mkdir" | "touch" => {
                entry.extend(paths.cloned());
            }
            "pvfs2-genconfig" => {
                if let Some(target) = command.get_args().last() {
                    entry.insert(target.clone());
                }
            }
            "rm" => {
                for path in paths {
                    let prefix = format!("{}/", path.trim_end_matches('/'));
                    entry.retain(|f| f != path && !f.starts_with(&prefix));
                }
            }
            _ => {}
        }
        if let Some(target) = command.stdout_target() {
            entry.insert(target.to_string());
        }
    }
}

#[async_trait]
impl RemoteCommandRunner for SimRunner {
    async fn run_one(&self, host: &HostId, command: &Command) -> Result<CommandOutput, TransportError> {
        self.record(Some(host), command.to_string(), command).await;
        self.check_reachable(host).await?;
        let output = self.respond(Some(host), command).await;
        if output.success() {
            self.apply_effects(Some(host), command).await;
        }
        Ok(output)
    }

    async fn copy_file(&self, host: &HostId, local: &Path, remote: &Path) -> Result<(), TransportError> {
        let copy = Command::new("copy").arg_path(remote);
        let rendered = format!("copy {} {}", local.display(), remote.display());
        self.record(Some(host), rendered, &copy).await;
        self.check_reachable(host).await?;

        let output = self.respond(Some(host), &copy).await;
        if !output.success() {
            return Err(TransportError::CopyFailed {
                host: host.clone(),
                reason: output.describe(),
            });
        }
        self.files
            .write()
            .await
            .entry(Some(host.clone()))
            .or_default()
            .insert(remote.to_string_lossy().into_owned());
        Ok(())
    }

    async fn run_local(&self, command: &Command) -> Result<CommandOutput, TransportError> {
        self.record(None, command.to_string(), command).await;
        let output = self.respond(None, command).await;
        if output.success() {
            self.apply_effects(None, command).await;
        }
        Ok(output)
    }
}

fn program_name(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}
