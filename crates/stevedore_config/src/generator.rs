//! Cluster config generation.

use crate::layout::DeploymentPaths;
use crate::params::{Binaries, ClusterParams, Protocol};
use serde::{Deserialize, Serialize};
use stevedore_core::{Command, DeployResult, HostId, RolePartition};

/// Generated cluster configuration
///
/// Holds everything a host needs to join the filesystem plus the command
/// that writes the server config file. Two calls to [`generate`] with equal
/// inputs produce equal values and identical [`render`](Self::render) bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Filesystem name
    pub fs_name: String,
    /// Transport protocol
    pub protocol: Protocol,
    /// Data port
    pub port: u16,
    /// Stripe distribution name
    pub stripe_dist: String,
    /// Stripe size in bytes
    pub stripe_size: u64,
    /// I/O servers, in partition order
    pub io_servers: Vec<HostId>,
    /// Metadata servers, in partition order
    pub metadata_servers: Vec<HostId>,
    /// On-host paths
    pub paths: DeploymentPaths,
    /// Executable locations
    pub binaries: Binaries,
    /// Command writing the config file at `paths.config_file`
    pub materialize: Command,
}

impl ClusterConfig {
    /// Canonical JSON encoding
    ///
    /// # Errors
    ///
    /// Returns `State` if encoding fails.
    pub fn render(&self) -> DeployResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// BLAKE3 digest of [`render`](Self::render), hex encoded
    ///
    /// # Errors
    ///
    /// Returns `State` if encoding fails.
    pub fn fingerprint(&self) -> DeployResult<String> {
        let bytes = self.render()?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    /// Endpoint a client mounts through `address`
    #[must_use]
    pub fn endpoint(&self, address: &str) -> String {
        let host = if address.contains(':') {
            format!("[{address}]")
        } else {
            address.to_string()
        };
        format!(
            "{}://{}:{}/{}",
            self.protocol.scheme(),
            host,
            self.port,
            self.fs_name
        )
    }
}

/// Generate the cluster config for `partition`
///
/// # Errors
///
/// Returns `UnsupportedProtocol` or `InvalidParameter` when `params` are
/// rejected. No partial document is produced.
pub fn generate(partition: &RolePartition, params: &ClusterParams) -> DeployResult<ClusterConfig> {
    let protocol = Protocol::parse(&params.protocol)?;
    params.validate()?;

    let paths = DeploymentPaths::build(
        &params.storage_root,
        &params.private_dir,
        params.mount_point.as_deref(),
    );
    let io_servers = partition.data_hosts.as_slice().to_vec();
    let metadata_servers = partition.metadata_hosts.as_slice().to_vec();

    let materialize = Command::new(params.binaries.genconfig())
        .arg("--quiet")
        .arg("--protocol")
        .arg(protocol.scheme())
        .arg(protocol.port_flag())
        .arg(params.port.to_string())
        .arg("--dist-name")
        .arg(params.stripe_dist.clone())
        .arg("--dist-params")
        .arg(format!("strip_size:{}", params.stripe_size))
        .arg("--ioservers")
        .arg(partition.data_hosts.join(","))
        .arg("--metaservers")
        .arg(partition.metadata_hosts.join(","))
        .arg("--storage")
        .arg_path(&paths.data_dir)
        .arg("--metadata")
        .arg_path(&paths.metadata_dir)
        .arg("--logfile")
        .arg_path(&paths.log_file)
        .arg("--fsname")
        .arg(params.fs_name.clone())
        .arg_path(&paths.config_file);

    Ok(ClusterConfig {
        fs_name: params.fs_name.clone(),
        protocol,
        port: params.port,
        stripe_dist: params.stripe_dist.clone(),
        stripe_size: params.stripe_size,
        io_servers,
        metadata_servers,
        paths,
        binaries: params.binaries.clone(),
        materialize,
    })
}
