use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Directory inside every addon install dir that holds the unpacked package.
/// npm tarballs put all files under `package/`.
pub const PACKAGE_DIR: &str = "package";

pub const MANIFEST_FILE: &str = "package.json";

/// Entry point used when the manifest has no `main`.
pub const DEFAULT_ENTRY_POINT: &str = "index.js";

/// Path of the manifest for the addon installed at `install_dir`.
pub fn manifest_path(install_dir: &Path) -> PathBuf {
    install_dir.join(PACKAGE_DIR).join(MANIFEST_FILE)
}

// ── Slot types ───────────────────────────────────────────────────────────────

/// Host UI surface an addon targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Reviewer,
    NoteEditor,
}

impl SlotType {
    pub const ALL: [Self; 2] = [Self::Reviewer, Self::NoteEditor];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reviewer => "reviewer",
            Self::NoteEditor => "note_editor",
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reviewer" => Ok(Self::Reviewer),
            "note_editor" => Ok(Self::NoteEditor),
            other => Err(Error::Message(format!(
                "unknown addon slot '{other}' (expected reviewer or note_editor)"
            ))),
        }
    }
}

// ── Manifest ─────────────────────────────────────────────────────────────────

/// Validated addon descriptor. Only [`crate::validate::ManifestValidator`]
/// builds these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonManifest {
    pub name: String,
    pub version: String,
    pub author: String,
    pub homepage: String,
    /// Compatibility field, equal to the configured host API version.
    pub api_version: String,
    pub addon_type: SlotType,
    pub keywords: Vec<String>,
    /// Script loaded into the host, relative to the package directory.
    pub entry_point: String,
    /// `dist.tarball` of registry documents. `None` for manifests read from disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_archive_url: Option<String>,
}

// ── Installed addons ─────────────────────────────────────────────────────────

/// An addon present in the install root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledAddon {
    /// Install directory name; the key used for enable/disable and removal.
    pub id: String,
    pub path: PathBuf,
    pub manifest: AddonManifest,
    /// Enabled state for `manifest.addon_type`.
    pub enabled: bool,
}

impl InstalledAddon {
    pub fn package_dir(&self) -> PathBuf {
        self.path.join(PACKAGE_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.path)
    }
}

// ── Downloads ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Success,
    Failed,
}

/// One archive download, owned by the installer until extraction finishes.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    pub status: DownloadStatus,
    pub bytes_written: u64,
}

impl DownloadTask {
    pub fn new(url: impl Into<String>, destination: PathBuf) -> Self {
        Self {
            url: url.into(),
            destination,
            status: DownloadStatus::Pending,
            bytes_written: 0,
        }
    }
}
