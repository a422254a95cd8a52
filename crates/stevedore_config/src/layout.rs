//! Filesystem layout on the target hosts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of server-side storage location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageRole {
    /// Bulk file data on I/O servers
    Data,
    /// Metadata database on metadata servers
    Metadata,
    /// Server log file
    Log,
}

impl StorageRole {
    /// Fixed entry name under the storage root
    #[must_use]
    pub fn entry_name(self) -> &'static str {
        match self {
            Self::Data => "orangefs_storage",
            Self::Metadata => "orangefs_metadata",
            Self::Log => "orangefs_server.log",
        }
    }
}

/// Path of `role`'s storage location under `root`
#[must_use]
pub fn storage_path(root: &Path, role: StorageRole) -> PathBuf {
    root.join(role.entry_name())
}

/// Every path a deployment touches on its hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentPaths {
    /// Per-deployment private directory
    pub private_dir: PathBuf,
    /// Generated cluster config file
    pub config_file: PathBuf,
    /// Client mount table (`pvfs2tab`)
    pub mount_table: PathBuf,
    /// Client mount point
    pub mount_point: PathBuf,
    /// Data directory on I/O servers
    pub data_dir: PathBuf,
    /// Metadata directory on metadata servers
    pub metadata_dir: PathBuf,
    /// Server log file
    pub log_file: PathBuf,
}

impl DeploymentPaths {
    /// Build the layout from a storage root and private directory
    #[must_use]
    pub fn build(storage_root: &Path, private_dir: &Path, mount_point: Option<&Path>) -> Self {
        Self {
            private_dir: private_dir.to_path_buf(),
            config_file: private_dir.join("orangefs.conf"),
            mount_table: private_dir.join("pvfs2tab"),
            mount_point: mount_point
                .map(Path::to_path_buf)
                .unwrap_or_else(|| private_dir.join("client")),
            data_dir: storage_path(storage_root, StorageRole::Data),
            metadata_dir: storage_path(storage_root, StorageRole::Metadata),
            log_file: storage_path(storage_root, StorageRole::Log),
        }
    }
}
