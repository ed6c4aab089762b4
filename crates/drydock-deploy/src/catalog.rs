//! Remote catalog formats: Java runtimes and vanilla server versions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Catalog of provisionable Java runtimes, keyed by symbolic identifier
/// and platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeCatalog {
    pub runtimes: Vec<RuntimeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEntry {
    /// Symbolic identifier instances reference, e.g. `temurin-17`.
    pub id: String,
    /// Per-platform artifacts, keyed `{os}-{arch}`.
    pub platforms: HashMap<String, RuntimeArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeArtifact {
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl RuntimeCatalog {
    pub fn resolve(&self, id: &str, platform: &str) -> Option<&RuntimeArtifact> {
        self.runtimes
            .iter()
            .find(|r| r.id == id)?
            .platforms
            .get(platform)
    }
}

/// The platform key of the host this process runs on.
pub fn platform_key() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Catalog of vanilla server versions, used for base-jar prefetch and the
/// mod-loader installer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VanillaCatalog {
    pub versions: Vec<VanillaVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VanillaVersion {
    pub id: String,
    pub server_url: String,
    #[serde(default)]
    pub server_sha256: Option<String>,
    #[serde(default)]
    pub mappings_url: Option<String>,
    #[serde(default)]
    pub mappings_sha256: Option<String>,
}

impl VanillaCatalog {
    pub fn resolve(&self, version: &str) -> Option<&VanillaVersion> {
        self.versions.iter().find(|v| v.id == version)
    }
}
