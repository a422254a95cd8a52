//! Persisted deployment records.
//!
//! Each deployment owns a directory under the store root holding two JSON
//! documents. `deployment.json` is written once per configure and read by
//! every other phase. `lifecycle.json` tracks where the deployment is and is
//! rewritten after each phase. Both are replaced atomically.

use crate::lifecycle::LifecycleState;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use stevedore_config::{ClusterConfig, RouteEntry};
use stevedore_core::{DeployError, DeployResult, Phase, RolePartition};
use tempfile::NamedTempFile;
use tracing::debug;

const DEPLOYMENT_FILE: &str = "deployment.json";
const LIFECYCLE_FILE: &str = "lifecycle.json";

/// Durable record of what configure decided
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    /// Deployment name
    pub name: String,
    /// Role assignment
    pub partition: RolePartition,
    /// Generated cluster config
    pub config: ClusterConfig,
    /// BLAKE3 fingerprint of the rendered config
    pub fingerprint: String,
    /// Mount table entry per client, in client order
    pub routes: Vec<RouteEntry>,
    /// When configure produced this record
    pub configured_at: DateTime<Utc>,
}

/// Current lifecycle position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRecord {
    /// Lifecycle state
    pub state: LifecycleState,
    /// Last transition time
    pub updated_at: DateTime<Utc>,
    /// Phase that produced this state
    pub last_phase: Option<Phase>,
    /// Run id of that phase
    pub last_run_id: Option<String>,
}

impl LifecycleRecord {
    /// Record `state` as produced now by `phase`
    #[must_use]
    pub fn new(state: LifecycleState, phase: Phase, run_id: impl Into<String>) -> Self {
        Self {
            state,
            updated_at: Utc::now(),
            last_phase: Some(phase),
            last_run_id: Some(run_id.into()),
        }
    }
}

impl Default for LifecycleRecord {
    fn default() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            updated_at: Utc::now(),
            last_phase: None,
            last_run_id: None,
        }
    }
}

/// Directory of deployment records
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    /// Store rooted at `root`; created lazily on first save
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check a deployment name is usable as a directory name
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` unless the name is non-empty `[A-Za-z0-9_-]`.
    pub fn validate_name(name: &str) -> DeployResult<()> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        {
            return Err(DeployError::InvalidParameter {
                field: "deployment".to_string(),
                reason: format!("{name:?} must be non-empty [A-Za-z0-9_-]"),
            });
        }
        Ok(())
    }

    fn dir(&self, name: &str) -> DeployResult<PathBuf> {
        Self::validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Whether a deployment record exists
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.dir(name)
            .map(|dir| dir.join(DEPLOYMENT_FILE).is_file())
            .unwrap_or(false)
    }

    /// Names of stored deployments, sorted
    ///
    /// # Errors
    ///
    /// Returns `State` if the root cannot be listed.
    pub fn list(&self) -> DeployResult<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().join(DEPLOYMENT_FILE).is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Save the deployment record
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a bad name or `State` on I/O failure.
    pub fn save_deployment(&self, state: &DeploymentState) -> DeployResult<()> {
        let path = self.dir(&state.name)?.join(DEPLOYMENT_FILE);
        write_json(&path, state)
    }

    /// Load the deployment record
    ///
    /// # Errors
    ///
    /// Returns `DeploymentNotFound` if nothing was saved under `name`.
    pub fn load_deployment(&self, name: &str) -> DeployResult<DeploymentState> {
        let path = self.dir(name)?.join(DEPLOYMENT_FILE);
        read_json(&path)?.ok_or_else(|| DeployError::DeploymentNotFound {
            name: name.to_string(),
        })
    }

    /// Save the lifecycle record
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a bad name or `State` on I/O failure.
    pub fn save_lifecycle(&self, name: &str, record: &LifecycleRecord) -> DeployResult<()> {
        let path = self.dir(name)?.join(LIFECYCLE_FILE);
        write_json(&path, record)
    }

    /// Load the lifecycle record, `Uninitialized` if none was saved
    ///
    /// # Errors
    ///
    /// Returns `State` if the record exists but cannot be read.
    pub fn load_lifecycle(&self, name: &str) -> DeployResult<LifecycleRecord> {
        let path = self.dir(name)?.join(LIFECYCLE_FILE);
        Ok(read_json(&path)?.unwrap_or_default())
    }
}

/// Write `value` as JSON through a temp file renamed over `path`
fn write_json<T: Serialize>(path: &Path, value: &T) -> DeployResult<()> {
    let dir = path.parent().ok_or_else(|| DeployError::State {
        reason: format!("{} has no parent directory", path.display()),
    })?;
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.write_all(b"\n")?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| DeployError::State {
        reason: format!("failed to persist {}: {}", path.display(), err.error),
    })?;

    debug!(path = %path.display(), "state written");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> DeployResult<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
