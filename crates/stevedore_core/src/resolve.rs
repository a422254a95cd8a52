//! Host name resolution.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Resolves host names to addresses
pub trait Resolver: Send + Sync {
    /// Resolve `host` to a single address
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the lookup fails or yields no address
    fn resolve(&self, host: &str) -> io::Result<IpAddr>;
}

/// What to do when a host cannot be resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvePolicy {
    /// Abort the phase
    #[default]
    Strict,
    /// Fall back to the host identifier and warn
    Tolerant,
}

/// Resolver backed by the operating system (`getaddrinfo`)
///
/// Prefers IPv4 answers, matching what the filesystem's mount tables expect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        let addrs: Vec<IpAddr> = (host, 0).to_socket_addrs()?.map(|a| a.ip()).collect();
        addrs
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address records"))
    }
}

/// Fixed name table, for tests and static inventories
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, IpAddr>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry
    #[must_use]
    pub fn with_entry(mut self, host: &str, ip: IpAddr) -> Self {
        self.entries.insert(host.to_string(), ip);
        self
    }

    /// Number of lookups served so far
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, host: &str) -> io::Result<IpAddr> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.entries.get(host).copied().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no entry for {host}"))
        })
    }
}
