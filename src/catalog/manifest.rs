//! Subset of the chain-registry `chain.json` schema we consume.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ChainManifest {
    #[serde(default)]
    pub chain_name: Option<String>,
    pub chain_id: String,
    #[serde(default)]
    pub pretty_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub apis: ManifestApis,
    #[serde(default)]
    pub explorers: Vec<ManifestExplorer>,
    #[serde(default)]
    pub codebase: Option<ManifestCodebase>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestApis {
    #[serde(default)]
    pub rpc: Vec<ManifestApi>,
    #[serde(default)]
    pub rest: Vec<ManifestApi>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestApi {
    pub address: String,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestExplorer {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestCodebase {
    /// Older registry layout.
    #[serde(default)]
    pub cosmos_sdk_version: Option<String>,
    /// Newer registry layout: `codebase.sdk.version`.
    #[serde(default)]
    pub sdk: Option<ManifestSdk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManifestSdk {
    #[serde(default)]
    pub version: Option<String>,
}

impl ChainManifest {
    pub fn is_live(&self) -> bool {
        self.status.as_deref() == Some("live")
    }

    pub fn sdk_version_str(&self) -> Option<&str> {
        let codebase = self.codebase.as_ref()?;
        codebase
            .cosmos_sdk_version
            .as_deref()
            .or_else(|| codebase.sdk.as_ref()?.version.as_deref())
    }
}
