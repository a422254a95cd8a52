//! Host identifiers and ordered host sets.
//!
//! A [`HostSet`] is the single source of ordering for every partition and
//! round-robin decision, so it is immutable: deriving a subset builds a new
//! set rather than editing one in place.

use crate::error::{DeployError, DeployResult};
use crate::resolve::Resolver;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::RwLock;

/// Host identifier - a hostname, FQDN or IP literal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostId(String);

impl HostId {
    /// Parse and validate a host identifier
    ///
    /// # Errors
    ///
    /// Returns `InvalidHostSource` for empty identifiers, identifiers starting
    /// with `-`, or characters outside `[A-Za-z0-9._:-]`.
    pub fn parse(raw: &str) -> DeployResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DeployError::InvalidHostSource {
                reason: "empty host entry".to_string(),
            });
        }
        if raw.starts_with('-') {
            return Err(DeployError::InvalidHostSource {
                reason: format!("host entry {raw:?} looks like an option"),
            });
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':')))
        {
            return Err(DeployError::InvalidHostSource {
                reason: format!("host entry {raw:?} contains {bad:?}"),
            });
        }
        Ok(Self(raw.to_string()))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse as an IP literal, if it is one
    #[must_use]
    pub fn as_ip(&self) -> Option<IpAddr> {
        self.0.parse().ok()
    }
}

impl TryFrom<String> for HostId {
    type Error = DeployError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HostId> for String {
    fn from(host: HostId) -> Self {
        host.0
    }
}

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a host pool comes from
///
/// Deserializes from either a JSON array of hosts or a string path to a
/// host file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostSource {
    /// Explicit ordered list
    List(Vec<String>),
    /// Host file, one entry per line
    File(PathBuf),
}

/// Ordered, duplicate-free set of hosts
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "Vec<HostId>", into = "Vec<HostId>")]
pub struct HostSet {
    hosts: Vec<HostId>,
    resolved: RwLock<HashMap<HostId, IpAddr>>,
}

impl HostSet {
    /// Build from already-parsed hosts
    ///
    /// # Errors
    ///
    /// Returns `InvalidHostSource` if the list is empty or holds duplicates.
    pub fn new(hosts: Vec<HostId>) -> DeployResult<Self> {
        if hosts.is_empty() {
            return Err(DeployError::InvalidHostSource {
                reason: "host list is empty".to_string(),
            });
        }
        let mut seen = HashSet::with_capacity(hosts.len());
        for host in &hosts {
            if !seen.insert(host) {
                return Err(DeployError::InvalidHostSource {
                    reason: format!("duplicate host {host}"),
                });
            }
        }
        Ok(Self::from_ordered(hosts))
    }

    fn from_ordered(hosts: Vec<HostId>) -> Self {
        Self {
            hosts,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Load a host set from a list or host file
    ///
    /// Host file entries may carry one bracketed range, e.g. `node-[01-04]`
    /// or `rack[1,3,5-6]`; ranges expand in order and keep zero padding.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHostSource` if the source is empty, unreadable,
    /// malformed or contains duplicates.
    pub fn load(source: &HostSource) -> DeployResult<Self> {
        let entries: Vec<String> = match source {
            HostSource::List(list) => list.clone(),
            HostSource::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    DeployError::InvalidHostSource {
                        reason: format!("cannot read {}: {e}", path.display()),
                    }
                })?;
                text.lines()
                    .map(|line| line.split('#').next().unwrap_or("").trim().to_string())
                    .filter(|line| !line.is_empty())
                    .collect()
            }
        };

        let mut hosts = Vec::new();
        for entry in &entries {
            for expanded in expand_range(entry)? {
                hosts.push(HostId::parse(&expanded)?);
            }
        }
        Self::new(hosts)
    }

    /// First `n` hosts in original order
    ///
    /// A zero count clamps to one host.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientHosts` if `n` exceeds the set size.
    pub fn subset(&self, n: usize) -> DeployResult<Self> {
        let n = n.max(1);
        if n > self.hosts.len() {
            return Err(DeployError::InsufficientHosts {
                requested: n,
                available: self.hosts.len(),
            });
        }
        Ok(Self::from_ordered(self.hosts[..n].to_vec()))
    }

    /// `n` consecutive hosts starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns `InsufficientHosts` if `n` is zero or the window runs past the
    /// end of the set.
    pub fn window(&self, offset: usize, n: usize) -> DeployResult<Self> {
        let end = offset.saturating_add(n);
        if n == 0 || end > self.hosts.len() {
            return Err(DeployError::InsufficientHosts {
                requested: end.max(offset + 1),
                available: self.hosts.len(),
            });
        }
        Ok(Self::from_ordered(self.hosts[offset..end].to_vec()))
    }

    /// Ordered union: every host of `self`, then hosts of `other` not yet seen
    #[must_use]
    pub fn union(&self, other: &HostSet) -> Self {
        let mut hosts = self.hosts.clone();
        for host in &other.hosts {
            if !hosts.contains(host) {
                hosts.push(host.clone());
            }
        }
        Self::from_ordered(hosts)
    }

    /// Resolve a host to an IP address, caching the answer for this set
    ///
    /// IP literals are returned without consulting the resolver.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError` if the resolver fails.
    pub fn resolve_ip(&self, host: &HostId, resolver: &dyn Resolver) -> DeployResult<IpAddr> {
        if let Some(ip) = host.as_ip() {
            return Ok(ip);
        }
        if let Some(ip) = self.cached(host) {
            return Ok(ip);
        }

        let ip = resolver
            .resolve(host.as_str())
            .map_err(|e| DeployError::ResolutionError {
                host: host.clone(),
                reason: e.to_string(),
            })?;
        tracing::debug!(host = %host, %ip, "resolved host");

        if let Ok(mut cache) = self.resolved.write() {
            cache.insert(host.clone(), ip);
        }
        Ok(ip)
    }

    fn cached(&self, host: &HostId) -> Option<IpAddr> {
        self.resolved.read().ok()?.get(host).copied()
    }

    /// Number of hosts
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the set is empty (never true for a constructed set)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Host at position `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&HostId> {
        self.hosts.get(index)
    }

    /// Whether `host` is a member
    #[must_use]
    pub fn contains(&self, host: &HostId) -> bool {
        self.hosts.contains(host)
    }

    /// Iterate in order
    pub fn iter(&self) -> std::slice::Iter<'_, HostId> {
        self.hosts.iter()
    }

    /// Hosts as a slice
    #[must_use]
    pub fn as_slice(&self) -> &[HostId] {
        &self.hosts
    }

    /// Join host names with `sep`
    #[must_use]
    pub fn join(&self, sep: &str) -> String {
        self.hosts
            .iter()
            .map(HostId::as_str)
            .collect::<Vec<_>>()
            .join(sep)
    }
}

impl Clone for HostSet {
    fn clone(&self) -> Self {
        let cache = self
            .resolved
            .read()
            .map(|cache| cache.clone())
            .unwrap_or_default();
        Self {
            hosts: self.hosts.clone(),
            resolved: RwLock::new(cache),
        }
    }
}

impl PartialEq for HostSet {
    fn eq(&self, other: &Self) -> bool {
        self.hosts == other.hosts
    }
}

impl Eq for HostSet {}

impl TryFrom<Vec<HostId>> for HostSet {
    type Error = DeployError;

    fn try_from(hosts: Vec<HostId>) -> Result<Self, Self::Error> {
        Self::new(hosts)
    }
}

impl From<HostSet> for Vec<HostId> {
    fn from(set: HostSet) -> Self {
        set.hosts
    }
}

impl<'a> IntoIterator for &'a HostSet {
    type Item = &'a HostId;
    type IntoIter = std::slice::Iter<'a, HostId>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

/// Upper bound on the hosts one range entry may expand to
pub const MAX_RANGE_HOSTS: u64 = 65_536;

fn expand_range(entry: &str) -> DeployResult<Vec<String>> {
    let Some(open) = entry.find('[') else {
        return Ok(vec![entry.to_string()]);
    };
    let close = entry[open..]
        .find(']')
        .map(|i| open + i)
        .ok_or_else(|| DeployError::InvalidHostSource {
            reason: format!("unterminated range in {entry:?}"),
        })?;
    let (prefix, suffix) = (&entry[..open], &entry[close + 1..]);

    let mut expanded = Vec::new();
    for item in entry[open + 1..close].split(',') {
        let item = item.trim();
        let (start, end) = item.split_once('-').unwrap_or((item, item));
        let bad_range = || DeployError::InvalidHostSource {
            reason: format!("bad range {item:?} in {entry:?}"),
        };
        let lo: u64 = start.parse().map_err(|_| bad_range())?;
        let hi: u64 = end.parse().map_err(|_| bad_range())?;
        if lo > hi {
            return Err(bad_range());
        }
        if (hi - lo).saturating_add(1).saturating_add(expanded.len() as u64) > MAX_RANGE_HOSTS {
            return Err(DeployError::InvalidHostSource {
                reason: format!("{entry:?} expands to more than {MAX_RANGE_HOSTS} hosts"),
            });
        }
        let width = start.len();
        for n in lo..=hi {
            expanded.push(format!("{prefix}{n:0width$}{suffix}"));
        }
    }
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::StaticResolver;
    use std::io::Write;

    fn hosts(names: &[&str]) -> HostSet {
        HostSet::load(&HostSource::List(
            names.iter().map(|s| s.to_string()).collect(),
        ))
        .unwrap()
    }

    #[test]
    fn test_host_id_rejects_shell_characters() {
        assert!(HostId::parse("node1").is_ok());
        assert!(HostId::parse("10.0.0.1").is_ok());
        assert!(HostId::parse("fe80::1").is_ok());
        assert!(HostId::parse("node;rm").is_err());
        assert!(HostId::parse("-oProxyCommand").is_err());
        assert!(HostId::parse("   ").is_err());
    }

    #[test]
    fn test_load_empty_fails() {
        let err = HostSet::load(&HostSource::List(vec![])).unwrap_err();
        assert!(matches!(err, DeployError::InvalidHostSource { .. }));
    }

    #[test]
    fn test_load_rejects_duplicates() {
        let err = HostSet::load(&HostSource::List(vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]))
        .unwrap_err();
        assert!(matches!(err, DeployError::InvalidHostSource { .. }));
    }

    #[test]
    fn test_load_host_file_with_ranges() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# compute nodes").unwrap();
        writeln!(file, "ares-comp-[08-10]").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "storage[1,3]-ib   # infiniband names").unwrap();

        let set = HostSet::load(&HostSource::File(file.path().to_path_buf())).unwrap();
        assert_eq!(
            set.join(","),
            "ares-comp-08,ares-comp-09,ares-comp-10,storage1-ib,storage3-ib"
        );
    }

    #[test]
    fn test_range_expansion_is_capped() {
        let err = HostSet::load(&HostSource::List(vec!["n[0-99999999999]".to_string()]))
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidHostSource { .. }));

        let err = expand_range("n[1-40000,1-40000]").unwrap_err();
        assert!(err.to_string().contains("65536"));

        assert_eq!(expand_range("n[1-65536]").unwrap().len(), 65_536);
    }

    #[test]
    fn test_load_missing_file() {
        let err = HostSet::load(&HostSource::File("/nonexistent/hostfile".into())).unwrap_err();
        assert!(matches!(err, DeployError::InvalidHostSource { .. }));
    }

    #[test]
    fn test_subset_keeps_order() {
        let set = hosts(&["h1", "h2", "h3", "h4"]);
        let sub = set.subset(2).unwrap();
        assert_eq!(sub.join(","), "h1,h2");
    }

    #[test]
    fn test_subset_zero_clamps_to_one() {
        let set = hosts(&["h1", "h2"]);
        assert_eq!(set.subset(0).unwrap().join(","), "h1");
    }

    #[test]
    fn test_subset_too_large() {
        let set = hosts(&["h1", "h2"]);
        assert_eq!(
            set.subset(3).unwrap_err(),
            DeployError::InsufficientHosts {
                requested: 3,
                available: 2
            }
        );
    }

    #[test]
    fn test_window_is_consecutive() {
        let set = hosts(&["h1", "h2", "h3", "h4"]);
        assert_eq!(set.window(1, 2).unwrap().join(","), "h2,h3");
        assert_eq!(set.window(3, 1).unwrap().join(","), "h4");
        assert_eq!(
            set.window(3, 2).unwrap_err(),
            DeployError::InsufficientHosts {
                requested: 5,
                available: 4
            }
        );
        assert!(set.window(0, 0).is_err());
    }

    #[test]
    fn test_union_preserves_first_order() {
        let a = hosts(&["h2", "h3"]);
        let b = hosts(&["h1", "h3", "h4"]);
        assert_eq!(a.union(&b).join(","), "h2,h3,h1,h4");
    }

    #[test]
    fn test_resolve_ip_literal_skips_resolver() {
        let set = hosts(&["10.1.2.3"]);
        let resolver = StaticResolver::new();
        let host = set.get(0).unwrap().clone();
        let ip = set.resolve_ip(&host, &resolver).unwrap();
        assert_eq!(ip.to_string(), "10.1.2.3");
    }

    #[test]
    fn test_resolve_ip_caches_per_set() {
        let set = hosts(&["meta1"]);
        let resolver = StaticResolver::new().with_entry("meta1", "192.168.0.7".parse().unwrap());
        let host = set.get(0).unwrap().clone();

        assert_eq!(set.resolve_ip(&host, &resolver).unwrap().to_string(), "192.168.0.7");
        assert_eq!(resolver.lookups(), 1);
        set.resolve_ip(&host, &resolver).unwrap();
        assert_eq!(resolver.lookups(), 1);

        // A derived subset owns a fresh cache
        let sub = set.subset(1).unwrap();
        sub.resolve_ip(&host, &resolver).unwrap();
        assert_eq!(resolver.lookups(), 2);
    }

    #[test]
    fn test_resolve_ip_failure() {
        let set = hosts(&["ghost"]);
        let resolver = StaticResolver::new();
        let host = set.get(0).unwrap().clone();
        let err = set.resolve_ip(&host, &resolver).unwrap_err();
        assert!(matches!(err, DeployError::ResolutionError { .. }));
    }

    #[test]
    fn test_serde_roundtrip_validates() {
        let set = hosts(&["h1", "h2"]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["h1","h2"]"#);
        let back: HostSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);

        assert!(serde_json::from_str::<HostSet>(r#"["h1","h1"]"#).is_err());
        assert!(serde_json::from_str::<HostSet>(r#"[]"#).is_err());
    }

    #[test]
    fn test_host_source_untagged() {
        let list: HostSource = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(list, HostSource::List(vec!["a".to_string(), "b".to_string()]));
        let file: HostSource = serde_json::from_str(r#""/etc/hosts.txt""#).unwrap();
        assert_eq!(file, HostSource::File("/etc/hosts.txt".into()));
    }

    proptest::proptest! {
        #[test]
        fn prop_subset_takes_prefix(k in 1usize..32, n in 0usize..40) {
            let names: Vec<String> = (0..k).map(|i| format!("h{i}")).collect();
            let set = HostSet::load(&HostSource::List(names.clone())).unwrap();
            let want = n.max(1).min(k);
            let sub = set.subset(n.clamp(1, k)).unwrap();
            proptest::prop_assert_eq!(sub.len(), want);
            for (i, host) in sub.iter().enumerate() {
                proptest::prop_assert_eq!(host.as_str(), names[i].as_str());
            }
        }
    }
}
