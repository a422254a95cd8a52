//! Per-client mount table entries.

use crate::generator::ClusterConfig;
use serde::{Deserialize, Serialize};
use stevedore_core::{Command, HostId};

/// Mount table record for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Client host
    pub client: HostId,
    /// Metadata server the client mounts through
    pub metadata_host: HostId,
    /// Address used in the endpoint
    pub address: String,
    /// `proto://address:port/fsname`
    pub endpoint: String,
    /// Full mount table line
    pub line: String,
}

impl RouteEntry {
    /// Build the entry for `client` served by `metadata_host` at `address`
    #[must_use]
    pub fn new(client: HostId, metadata_host: HostId, address: &str, config: &ClusterConfig) -> Self {
        let endpoint = config.endpoint(address);
        let line = format!(
            "{} {} pvfs2 defaults,auto 0 0",
            endpoint,
            config.paths.mount_point.display()
        );
        Self {
            client,
            metadata_host,
            address: address.to_string(),
            endpoint,
            line,
        }
    }

    /// Command writing this entry into the client's mount table
    #[must_use]
    pub fn write_command(&self, config: &ClusterConfig) -> Command {
        Command::new("printf")
            .arg("%s\\n")
            .arg(self.line.clone())
            .stdout_to(&config.paths.mount_table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate;
    use crate::params::ClusterParams;
    use stevedore_core::{HostSet, HostSource, PartitionSpec, RolePartition};

    fn config() -> ClusterConfig {
        let pool = HostSet::load(&HostSource::List(vec!["h1".into(), "h2".into()])).unwrap();
        let part = RolePartition::derive(&pool, &PartitionSpec::default()).unwrap();
        generate(&part, &ClusterParams::new("/mnt/nvme", "/tmp/ofs")).unwrap()
    }

    #[test]
    fn test_route_line() {
        let config = config();
        let entry = RouteEntry::new(
            HostId::parse("h2").unwrap(),
            HostId::parse("h1").unwrap(),
            "10.0.0.1",
            &config,
        );
        assert_eq!(entry.endpoint, "tcp://10.0.0.1:3334/orangefs");
        assert_eq!(
            entry.line,
            "tcp://10.0.0.1:3334/orangefs /tmp/ofs/client pvfs2 defaults,auto 0 0"
        );
    }

    #[test]
    fn test_write_command_targets_mount_table() {
        let config = config();
        let entry = RouteEntry::new(
            HostId::parse("h2").unwrap(),
            HostId::parse("h1").unwrap(),
            "h1",
            &config,
        );
        let cmd = entry.write_command(&config);
        assert_eq!(cmd.stdout_target(), Some("/tmp/ofs/pvfs2tab"));
        assert_eq!(cmd.get_args()[1], entry.line);
    }
}
