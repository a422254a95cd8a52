//! Role partitioning and client routing.
//!
//! Both are pure functions of an ordered [`HostSet`]; running them on two
//! different machines with the same host list yields the same topology.

use crate::error::{DeployError, DeployResult};
use crate::host::{HostId, HostSet};
use serde::{Deserialize, Serialize};

/// How role host sets relate to each other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleLayout {
    /// Every role is a prefix of the pool, so roles overlap
    #[default]
    Shared,
    /// Roles are consecutive, non-overlapping slices of the pool:
    /// metadata first, then data, then clients
    Disjoint,
}

/// Requested role sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionSpec {
    /// Metadata servers (default: a quarter of the pool, at least one)
    pub metadata_count: Option<usize>,
    /// Data servers (shared default: whole pool; disjoint default: half of
    /// the hosts left after metadata, rounded up)
    pub data_count: Option<usize>,
    /// Clients (shared default: whole pool; disjoint default: every host
    /// left after metadata and data)
    pub client_count: Option<usize>,
    /// Shared prefixes or disjoint slices
    pub layout: RoleLayout,
}

impl PartitionSpec {
    /// Set metadata server count
    #[must_use]
    pub fn with_metadata_count(mut self, count: usize) -> Self {
        self.metadata_count = Some(count);
        self
    }

    /// Set data server count
    #[must_use]
    pub fn with_data_count(mut self, count: usize) -> Self {
        self.data_count = Some(count);
        self
    }

    /// Set client count
    #[must_use]
    pub fn with_client_count(mut self, count: usize) -> Self {
        self.client_count = Some(count);
        self
    }

    /// Set role layout
    #[must_use]
    pub fn with_layout(mut self, layout: RoleLayout) -> Self {
        self.layout = layout;
        self
    }
}

/// Hosts assigned to each role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePartition {
    /// Metadata servers, never empty
    pub metadata_hosts: HostSet,
    /// Data (I/O) servers
    pub data_hosts: HostSet,
    /// Client hosts
    pub client_hosts: HostSet,
}

impl RolePartition {
    /// Partition `pool` according to `spec`
    ///
    /// The metadata count is clamped into `[1, pool.len()]`. Explicit data
    /// and client counts of zero are raised to one. Under
    /// [`RoleLayout::Shared`] each role is a prefix of the pool; under
    /// [`RoleLayout::Disjoint`] the three roles are carved from the pool in
    /// order and share no host.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientHosts` if the roles do not fit in the pool.
    pub fn derive(pool: &HostSet, spec: &PartitionSpec) -> DeployResult<Self> {
        let metadata_count = spec
            .metadata_count
            .unwrap_or(pool.len() / 4)
            .clamp(1, pool.len());

        match spec.layout {
            RoleLayout::Shared => Ok(Self {
                metadata_hosts: pool.subset(metadata_count)?,
                data_hosts: pool.subset(spec.data_count.unwrap_or(pool.len()))?,
                client_hosts: pool.subset(spec.client_count.unwrap_or(pool.len()))?,
            }),
            RoleLayout::Disjoint => Self::carve(pool, spec, metadata_count),
        }
    }

    fn carve(pool: &HostSet, spec: &PartitionSpec, metadata_count: usize) -> DeployResult<Self> {
        let rest = pool.len().saturating_sub(metadata_count);
        let data_count = spec.data_count.unwrap_or(rest.div_ceil(2)).max(1);
        let client_count = spec
            .client_count
            .unwrap_or(rest.saturating_sub(data_count))
            .max(1);

        let requested = metadata_count + data_count + client_count;
        if requested > pool.len() {
            return Err(DeployError::InsufficientHosts {
                requested,
                available: pool.len(),
            });
        }

        Ok(Self {
            metadata_hosts: pool.window(0, metadata_count)?,
            data_hosts: pool.window(metadata_count, data_count)?,
            client_hosts: pool.window(metadata_count + data_count, client_count)?,
        })
    }

    /// Every host running a server process: data hosts, then metadata hosts
    /// not already listed
    #[must_use]
    pub fn server_hosts(&self) -> HostSet {
        self.data_hosts.union(&self.metadata_hosts)
    }

    /// Every host taking part in the deployment
    #[must_use]
    pub fn all_hosts(&self) -> HostSet {
        self.server_hosts().union(&self.client_hosts)
    }

    /// Route map for the client hosts
    #[must_use]
    pub fn routes(&self) -> ClientRouteMap<'_> {
        ClientRouteMap::new(&self.metadata_hosts)
    }
}

/// Assignment of clients to metadata servers
///
/// Client `i` talks to `metadata_hosts[i mod len]`. The mapping depends only
/// on the client's position and the metadata host ordering.
#[derive(Debug, Clone, Copy)]
pub struct ClientRouteMap<'a> {
    metadata_hosts: &'a HostSet,
}

impl<'a> ClientRouteMap<'a> {
    /// Create a route map over `metadata_hosts`
    #[must_use]
    pub fn new(metadata_hosts: &'a HostSet) -> Self {
        Self { metadata_hosts }
    }

    /// Metadata host for the client at `client_index`
    ///
    /// # Errors
    ///
    /// Returns `InvalidHostSource` if the metadata set is empty.
    pub fn route(&self, client_index: usize) -> DeployResult<&'a HostId> {
        let count = self.metadata_hosts.len();
        if count == 0 {
            return Err(DeployError::InvalidHostSource {
                reason: "no metadata hosts to route to".to_string(),
            });
        }
        self.metadata_hosts
            .get(client_index % count)
            .ok_or_else(|| DeployError::InvalidHostSource {
                reason: format!("route index {client_index} out of range"),
            })
    }

    /// `(client, metadata host)` pairs for every client in order
    ///
    /// # Errors
    ///
    /// Returns `InvalidHostSource` if the metadata set is empty.
    pub fn assign<'c>(&self, clients: &'c HostSet) -> DeployResult<Vec<(&'c HostId, &'a HostId)>> {
        clients
            .iter()
            .enumerate()
            .map(|(i, client)| Ok((client, self.route(i)?)))
            .collect()
    }
}
