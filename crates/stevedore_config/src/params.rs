//! Scalar cluster parameters.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use stevedore_core::{DeployError, DeployResult};

/// Default data port
pub const DEFAULT_PORT: u16 = 3334;
/// Default stripe size in bytes
pub const DEFAULT_STRIPE_SIZE: u64 = 65536;
/// Default stripe distribution
pub const DEFAULT_STRIPE_DIST: &str = "simple_stripe";
/// Default filesystem name
pub const DEFAULT_FS_NAME: &str = "orangefs";

/// Network transport between clients and servers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// TCP/IP
    Tcp,
    /// InfiniBand verbs
    Infiniband,
}

impl Protocol {
    /// Parse a protocol selector
    ///
    /// Accepts `tcp`, `infiniband` and the short form `ib`, case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedProtocol` for anything else.
    pub fn parse(raw: &str) -> DeployResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "ib" | "infiniband" => Ok(Self::Infiniband),
            _ => Err(DeployError::UnsupportedProtocol(raw.to_string())),
        }
    }

    /// Scheme used in endpoints and by `pvfs2-genconfig --protocol`
    #[must_use]
    pub fn scheme(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Infiniband => "ib",
        }
    }

    /// `pvfs2-genconfig` flag carrying the port for this protocol
    #[must_use]
    pub fn port_flag(self) -> &'static str {
        match self {
            Self::Tcp => "--tcpport",
            Self::Infiniband => "--ibport",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Locations of the filesystem's executables
///
/// With no install prefix every binary is invoked by bare name and found
/// through `PATH` on the target host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Binaries {
    /// Installation prefix holding `bin/` and `sbin/`
    pub install_prefix: Option<PathBuf>,
    /// Kernel module providing the client filesystem
    pub kernel_module: Option<String>,
}

impl Binaries {
    fn locate(&self, dir: &str, name: &str) -> String {
        match &self.install_prefix {
            Some(prefix) => prefix.join(dir).join(name).to_string_lossy().into_owned(),
            None => name.to_string(),
        }
    }

    /// Config generator
    #[must_use]
    pub fn genconfig(&self) -> String {
        self.locate("bin", "pvfs2-genconfig")
    }

    /// Server daemon
    #[must_use]
    pub fn server(&self) -> String {
        self.locate("sbin", "pvfs2-server")
    }

    /// Health check tool
    #[must_use]
    pub fn ping(&self) -> String {
        self.locate("bin", "pvfs2-ping")
    }

    /// Client daemon
    #[must_use]
    pub fn client(&self) -> String {
        self.locate("sbin", "pvfs2-client")
    }

    /// Client core helper started by the client daemon
    #[must_use]
    pub fn client_core(&self) -> String {
        self.locate("sbin", "pvfs2-client-core")
    }

    /// Shared library directory of the install, if one is set
    #[must_use]
    pub fn library_dir(&self) -> Option<String> {
        self.install_prefix
            .as_ref()
            .map(|prefix| prefix.join("lib").to_string_lossy().into_owned())
    }

    /// Kernel module name
    #[must_use]
    pub fn module(&self) -> &str {
        self.kernel_module.as_deref().unwrap_or("orangefs")
    }
}

/// Scalar parameters for one cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterParams {
    /// Filesystem name, also the endpoint path
    #[serde(default = "default_fs_name")]
    pub fs_name: String,
    /// Protocol selector, validated at generation time
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Data port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Stripe size in bytes
    #[serde(default = "default_stripe_size")]
    pub stripe_size: u64,
    /// Stripe distribution name
    #[serde(default = "default_stripe_dist")]
    pub stripe_dist: String,
    /// Root under which server storage directories are created
    pub storage_root: PathBuf,
    /// Per-deployment directory for the config file and mount table
    pub private_dir: PathBuf,
    /// Client mount point (default: `<private_dir>/client`)
    #[serde(default)]
    pub mount_point: Option<PathBuf>,
    /// Executable locations
    #[serde(default)]
    pub binaries: Binaries,
}

fn default_fs_name() -> String {
    DEFAULT_FS_NAME.to_string()
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_stripe_size() -> u64 {
    DEFAULT_STRIPE_SIZE
}

fn default_stripe_dist() -> String {
    DEFAULT_STRIPE_DIST.to_string()
}

impl ClusterParams {
    /// Create parameters with defaults for everything but the directories
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>, private_dir: impl Into<PathBuf>) -> Self {
        Self {
            fs_name: default_fs_name(),
            protocol: default_protocol(),
            port: DEFAULT_PORT,
            stripe_size: DEFAULT_STRIPE_SIZE,
            stripe_dist: default_stripe_dist(),
            storage_root: storage_root.into(),
            private_dir: private_dir.into(),
            mount_point: None,
            binaries: Binaries::default(),
        }
    }

    /// Set protocol selector
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Set port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set stripe size
    #[must_use]
    pub fn with_stripe_size(mut self, size: u64) -> Self {
        self.stripe_size = size;
        self
    }

    /// Set mount point
    #[must_use]
    pub fn with_mount_point(mut self, mount: impl Into<PathBuf>) -> Self {
        self.mount_point = Some(mount.into());
        self
    }

    /// Set filesystem name
    #[must_use]
    pub fn with_fs_name(mut self, name: impl Into<String>) -> Self {
        self.fs_name = name.into();
        self
    }

    /// Validate everything except the protocol
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` naming the first offending field.
    pub fn validate(&self) -> DeployResult<()> {
        if self.fs_name.is_empty()
            || !self
                .fs_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        {
            return Err(invalid("fs_name", "must be non-empty [A-Za-z0-9_-]"));
        }
        if self.port == 0 {
            return Err(invalid("port", "must be non-zero"));
        }
        if self.stripe_size == 0 {
            return Err(invalid("stripe_size", "must be non-zero"));
        }
        if self.stripe_dist.is_empty() {
            return Err(invalid("stripe_dist", "must be non-empty"));
        }
        if !self.storage_root.is_absolute() {
            return Err(invalid("storage_root", "must be absolute"));
        }
        if !self.private_dir.is_absolute() {
            return Err(invalid("private_dir", "must be absolute"));
        }
        if let Some(mount) = &self.mount_point {
            if !mount.is_absolute() {
                return Err(invalid("mount_point", "must be absolute"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> DeployError {
    DeployError::InvalidParameter {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_parse() {
        assert_eq!(Protocol::parse("tcp").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::parse("IB").unwrap(), Protocol::Infiniband);
        assert_eq!(Protocol::parse("infiniband").unwrap(), Protocol::Infiniband);
        assert_eq!(
            Protocol::parse("udp").unwrap_err(),
            DeployError::UnsupportedProtocol("udp".to_string())
        );
    }

    #[test]
    fn test_protocol_flags() {
        assert_eq!(Protocol::Tcp.port_flag(), "--tcpport");
        assert_eq!(Protocol::Infiniband.port_flag(), "--ibport");
        assert_eq!(Protocol::Infiniband.to_string(), "ib");
    }

    #[test]
    fn test_binaries_bare_names() {
        let bins = Binaries::default();
        assert_eq!(bins.server(), "pvfs2-server");
        assert_eq!(bins.module(), "orangefs");
    }

    #[test]
    fn test_binaries_with_prefix() {
        let bins = Binaries {
            install_prefix: Some("/opt/orangefs".into()),
            kernel_module: Some("pvfs2".to_string()),
        };
        assert_eq!(bins.genconfig(), "/opt/orangefs/bin/pvfs2-genconfig");
        assert_eq!(bins.client_core(), "/opt/orangefs/sbin/pvfs2-client-core");
        assert_eq!(bins.library_dir().as_deref(), Some("/opt/orangefs/lib"));
        assert_eq!(bins.module(), "pvfs2");
        assert_eq!(Binaries::default().library_dir(), None);
    }

    #[test]
    fn test_params_defaults_from_json() {
        let params: ClusterParams = serde_json::from_str(
            r#"{"storage_root": "/mnt/nvme", "private_dir": "/tmp/ofs"}"#,
        )
        .unwrap();
        assert_eq!(params, ClusterParams::new("/mnt/nvme", "/tmp/ofs"));
        assert_eq!(params.port, 3334);
        assert_eq!(params.stripe_size, 65536);
    }

    #[test]
    fn test_validate() {
        assert!(ClusterParams::new("/mnt/nvme", "/tmp/ofs").validate().is_ok());

        let err = ClusterParams::new("relative", "/tmp/ofs").validate().unwrap_err();
        assert!(matches!(err, DeployError::InvalidParameter { ref field, .. } if field == "storage_root"));

        let err = ClusterParams::new("/a", "/b").with_port(0).validate().unwrap_err();
        assert!(matches!(err, DeployError::InvalidParameter { ref field, .. } if field == "port"));

        let err = ClusterParams::new("/a", "/b")
            .with_fs_name("bad name")
            .validate()
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidParameter { ref field, .. } if field == "fs_name"));
    }
}
