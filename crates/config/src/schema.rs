/// Config schema types (registry, compatibility contract, install limits).
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JsAddonsConfig {
    pub registry: RegistryConfig,
    pub compatibility: CompatibilityConfig,
    pub install: InstallConfig,
}

/// Package registry lookup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// "Latest version" endpoint. `{name}` is replaced by the addon identifier.
    pub url_template: String,
    pub connect_timeout_secs: u64,
    /// Longest a single read may stall. Applies to registry lookups and
    /// archive downloads alike; a slow but steady download never trips it.
    pub read_timeout_secs: u64,
    /// Upper bound for a whole registry lookup, body included. Archive
    /// downloads are bounded by size instead.
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url_template: "https://registry.npmjs.org/{name}/latest".into(),
            connect_timeout_secs: 10,
            read_timeout_secs: 20,
            request_timeout_secs: 20,
            user_agent: format!("jsaddons/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl RegistryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// The host's addon compatibility contract.
///
/// There is no version-range matching: a manifest is compatible only if its
/// API field equals `api_version` exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilityConfig {
    pub api_version: String,
    /// Marker keyword every addon package must list in `keywords`.
    pub keyword: String,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self {
            api_version: "0.0.1".into(),
            keyword: "ankidroid-js-addon".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Directory under the data dir holding one subdirectory per addon.
    pub addons_dir_name: String,
    /// Downloads larger than this are aborted.
    pub max_archive_bytes: u64,
    /// Total size of all files in an archive once unpacked.
    pub max_unpacked_bytes: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            addons_dir_name: "addons".into(),
            max_archive_bytes: 20 * 1024 * 1024,
            max_unpacked_bytes: 100 * 1024 * 1024,
        }
    }
}
