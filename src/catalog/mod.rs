//! Endpoint catalog: the set of known chains and their declared endpoints.
//!
//! Built once from an unpacked chain registry (one `chain.json` per chain
//! directory) and handed out as an immutable `Arc<Catalog>` snapshot.
//! Refreshing produces a new snapshot and swaps it through `CatalogHandle`;
//! nothing ever mutates a published catalog.

mod manifest;

pub use manifest::ChainManifest;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("chain {0} not found in registry")]
    ChainNotFound(String),
    #[error("failed to read registry: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Rpc,
    Rest,
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Rpc => write!(f, "rpc"),
            EndpointKind::Rest => write!(f, "rest"),
        }
    }
}

/// A base URL plus transport kind. Carries no liveness state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub url: String,
    pub kind: EndpointKind,
}

impl Endpoint {
    pub fn new(url: &str, kind: EndpointKind) -> Self {
        Self {
            url: url.trim().trim_end_matches('/').to_string(),
            kind,
        }
    }

    /// Join a path (starting with `/`) onto the base URL.
    pub fn join(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkType {
    Mainnet,
    Testnet,
    Devnet,
    Unknown,
}

impl NetworkType {
    /// Lookup priority order.
    pub const ALL: [NetworkType; 4] = [
        NetworkType::Mainnet,
        NetworkType::Testnet,
        NetworkType::Devnet,
        NetworkType::Unknown,
    ];

    fn from_manifest(raw: Option<&str>) -> Self {
        match raw {
            Some("mainnet") => NetworkType::Mainnet,
            Some("testnet") => NetworkType::Testnet,
            Some("devnet") => NetworkType::Devnet,
            _ => NetworkType::Unknown,
        }
    }
}

/// Semantic SDK version as declared by the registry. Many chains publish
/// nothing or something unparsable, in which case the chain simply has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SdkVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SdkVersion {
    /// Lenient parse: `v0.47.5`, `0.45`, `v0.50.1-lsm` all succeed.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let core = trimmed
            .split(|c: char| c == '-' || c == '+')
            .next()
            .unwrap_or_default();

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => return None,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for SdkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explorer {
    pub kind: String,
    pub url: String,
}

/// One monitored network.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Registry directory name, e.g. "osmosis".
    pub name: String,
    pub chain_id: String,
    pub pretty_name: String,
    pub network_type: NetworkType,
    pub rpc_endpoints: Vec<Endpoint>,
    pub rest_endpoints: Vec<Endpoint>,
    /// When set, used verbatim instead of probing `rest_endpoints`.
    pub endpoint_overrides: Option<Vec<Endpoint>>,
    /// kind → explorer
    pub explorers: HashMap<String, Explorer>,
    pub sdk_version: Option<SdkVersion>,
}

impl Chain {
    pub fn from_manifest(name: &str, manifest: ChainManifest) -> Self {
        let sdk_version = manifest.sdk_version_str().and_then(SdkVersion::parse);
        if sdk_version.is_none() {
            debug!(chain = %name, "no parsable SDK version declared");
        }

        let explorers = manifest
            .explorers
            .iter()
            .filter_map(|e| {
                let kind = e.kind.clone()?;
                let url = e.url.clone()?;
                Some((kind.clone(), Explorer { kind, url }))
            })
            .collect();

        Self {
            name: name.to_string(),
            chain_id: manifest.chain_id.clone(),
            pretty_name: manifest
                .pretty_name
                .clone()
                .unwrap_or_else(|| name.to_string()),
            network_type: NetworkType::from_manifest(manifest.network_type.as_deref()),
            rpc_endpoints: manifest
                .apis
                .rpc
                .iter()
                .map(|a| Endpoint::new(&a.address, EndpointKind::Rpc))
                .collect(),
            rest_endpoints: manifest
                .apis
                .rest
                .iter()
                .map(|a| Endpoint::new(&a.address, EndpointKind::Rest))
                .collect(),
            endpoint_overrides: None,
            explorers,
            sdk_version,
        }
    }
}

/// Immutable snapshot of every live chain in the registry.
#[derive(Debug, Default)]
pub struct Catalog {
    buckets: BTreeMap<NetworkType, BTreeMap<String, Arc<Chain>>>,
}

impl Catalog {
    /// Build from `(registry directory name, chain.json contents)` pairs.
    /// Non-live chains are dropped; unparsable manifests are skipped.
    pub fn from_manifests<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let mut buckets: BTreeMap<NetworkType, BTreeMap<String, Arc<Chain>>> = BTreeMap::new();
        let mut skipped = 0usize;

        for (name, raw) in entries {
            let manifest: ChainManifest = match serde_json::from_value(raw) {
                Ok(m) => m,
                Err(e) => {
                    warn!(chain = %name, error = %e, "unable to extract chain information, skipping");
                    skipped += 1;
                    continue;
                }
            };

            if !manifest.is_live() {
                debug!(chain = %name, status = ?manifest.status, "chain not live, skipping");
                continue;
            }

            let chain = Chain::from_manifest(&name, manifest);
            buckets
                .entry(chain.network_type)
                .or_default()
                .insert(name, Arc::new(chain));
        }

        let catalog = Self { buckets };
        info!(chains = catalog.len(), skipped = skipped, "chain catalog loaded");
        catalog
    }

    /// Walk an unpacked registry for `chain.json` files. Directories whose
    /// path contains "template" are ignored.
    pub fn load_dir(root: &Path) -> Result<Self, CatalogError> {
        let mut entries = Vec::new();
        collect_manifests(root, &mut entries)?;
        Ok(Self::from_manifests(entries))
    }

    /// Pin endpoint override lists onto chains, keyed by chain key.
    pub fn with_overrides(self, overrides: &HashMap<String, Vec<String>>) -> Self {
        if overrides.is_empty() {
            return self;
        }
        let mut buckets = self.buckets;
        for bucket in buckets.values_mut() {
            for chain in bucket.values_mut() {
                let pinned = overrides
                    .get(&chain.name)
                    .or_else(|| overrides.get(&chain.chain_id));
                if let Some(urls) = pinned {
                    let mut updated = (**chain).clone();
                    updated.endpoint_overrides = Some(
                        urls.iter()
                            .map(|u| Endpoint::new(u, EndpointKind::Rest))
                            .collect(),
                    );
                    info!(chain = %updated.name, endpoints = urls.len(), "endpoint override applied");
                    *chain = Arc::new(updated);
                }
            }
        }
        Self { buckets }
    }

    /// Exact registry-name match first, then a scan on `chain_id`, both in
    /// mainnet → testnet → devnet → unknown order.
    pub fn get_chain(&self, key: &str) -> Result<Arc<Chain>, CatalogError> {
        for network in NetworkType::ALL {
            if let Some(chain) = self.buckets.get(&network).and_then(|b| b.get(key)) {
                return Ok(chain.clone());
            }
        }
        for network in NetworkType::ALL {
            if let Some(bucket) = self.buckets.get(&network) {
                if let Some(chain) = bucket.values().find(|c| c.chain_id == key) {
                    return Ok(chain.clone());
                }
            }
        }
        Err(CatalogError::ChainNotFound(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn collect_manifests(
    dir: &Path,
    out: &mut Vec<(String, serde_json::Value)>,
) -> Result<(), CatalogError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let skip = path
            .file_name()
            .map(|n| n.to_string_lossy().contains("template"))
            .unwrap_or(false);
        if skip {
            continue;
        }
        if path.is_dir() {
            collect_manifests(&path, out)?;
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) != Some("chain.json") {
            continue;
        }

        let name = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()));
        match parsed {
            Ok(value) => out.push((name, value)),
            Err(e) => warn!(path = %path.display(), error = %e, "unreadable chain.json, skipping"),
        }
    }
    Ok(())
}

/// Process-scoped owner of the current catalog snapshot.
#[derive(Clone, Default)]
pub struct CatalogHandle {
    current: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Atomically swap in a freshly loaded catalog.
    pub fn replace(&self, catalog: Catalog) {
        let next = Arc::new(catalog);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(chain_id: &str, network: &str, status: &str) -> serde_json::Value {
        json!({
            "chain_name": chain_id,
            "chain_id": chain_id,
            "pretty_name": chain_id.to_uppercase(),
            "status": status,
            "network_type": network,
            "apis": {
                "rpc": [{"address": "https://rpc.example.com/"}],
                "rest": [{"address": "https://rest.example.com"}, {"address": "https://rest2.example.com"}]
            },
            "explorers": [{"kind": "mintscan", "url": "https://www.mintscan.io/x"}],
            "codebase": {"cosmos_sdk_version": "v0.47.5"}
        })
    }

    fn sample() -> Catalog {
        Catalog::from_manifests(vec![
            ("osmosis".to_string(), manifest("osmosis-1", "mainnet", "live")),
            ("osmosistestnet".to_string(), manifest("osmo-test-5", "testnet", "live")),
            ("deadchain".to_string(), manifest("dead-1", "mainnet", "killed")),
            ("broken".to_string(), json!({"status": "live"})),
        ])
    }

    #[test]
    fn test_lookup_by_name_then_chain_id() {
        let catalog = sample();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get_chain("osmosis").unwrap().chain_id, "osmosis-1");
        assert_eq!(catalog.get_chain("osmo-test-5").unwrap().name, "osmosistestnet");
        assert!(matches!(
            catalog.get_chain("dead-1"),
            Err(CatalogError::ChainNotFound(_))
        ));
    }

    #[test]
    fn test_manifest_fields() {
        let catalog = sample();
        let chain = catalog.get_chain("osmosis").unwrap();
        assert_eq!(chain.rpc_endpoints[0].url, "https://rpc.example.com");
        assert_eq!(chain.rest_endpoints.len(), 2);
        assert_eq!(chain.explorers["mintscan"].url, "https://www.mintscan.io/x");
        assert_eq!(
            chain.sdk_version,
            Some(SdkVersion { major: 0, minor: 47, patch: 5 })
        );
    }

    #[test]
    fn test_sdk_version_parsing() {
        assert_eq!(SdkVersion::parse("0.45"), Some(SdkVersion { major: 0, minor: 45, patch: 0 }));
        assert_eq!(
            SdkVersion::parse("v0.50.1-lsm"),
            Some(SdkVersion { major: 0, minor: 50, patch: 1 })
        );
        assert_eq!(SdkVersion::parse("v0.46.x"), None);
        assert_eq!(SdkVersion::parse(""), None);
        assert_eq!(SdkVersion::parse("latest"), None);
    }

    #[test]
    fn test_overrides_replace_chain() {
        let mut overrides = HashMap::new();
        overrides.insert("osmosis".to_string(), vec!["https://pinned.example/".to_string()]);
        let catalog = sample().with_overrides(&overrides);
        let chain = catalog.get_chain("osmosis-1").unwrap();
        let pinned = chain.endpoint_overrides.as_ref().unwrap();
        assert_eq!(pinned[0].url, "https://pinned.example");
        assert!(catalog.get_chain("osmosistestnet").unwrap().endpoint_overrides.is_none());
    }

    #[test]
    fn test_handle_swaps_snapshot() {
        let handle = CatalogHandle::new(sample());
        let before = handle.snapshot();
        handle.replace(Catalog::default());
        assert_eq!(before.len(), 2);
        assert!(handle.snapshot().is_empty());
    }

    #[test]
    fn test_load_dir_skips_templates() {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in [
            ("juno", manifest("juno-1", "mainnet", "live")),
            ("_template", manifest("template-1", "mainnet", "live")),
        ] {
            let chain_dir = dir.path().join(name);
            std::fs::create_dir_all(&chain_dir).unwrap();
            std::fs::write(chain_dir.join("chain.json"), value.to_string()).unwrap();
        }

        let catalog = Catalog::load_dir(dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get_chain("juno").is_ok());
    }
}
