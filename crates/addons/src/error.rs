use std::path::{Path, PathBuf};

use thiserror::Error;

/// Why a manifest document was rejected.
///
/// Checked in declaration order by [`crate::validate::ManifestValidator`], so a
/// document with several problems reports the first one only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("manifest is not a JSON object: {0}")]
    MalformedManifest(String),

    #[error("incompatible addon API version: expected \"{expected}\", found {found:?}")]
    IncompatibleApiVersion {
        expected: String,
        found: Option<String>,
    },

    #[error("package keywords do not include \"{0}\"")]
    NotAnAddonPackage(String),

    #[error("manifest field '{0}' is missing or empty")]
    IncompleteManifest(&'static str),

    #[error("unknown addon type {0:?}")]
    UnknownAddonType(Option<String>),

    #[error("manifest has no dist.tarball URL")]
    MissingArchiveUrl,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid addon identifier {0:?}")]
    InvalidIdentifier(String),

    #[error("'{name}' is not a valid addon: {reason}")]
    InvalidAddon {
        name: String,
        #[source]
        reason: ValidationError,
    },

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("registry lookup for '{name}' failed with HTTP {status}")]
    RegistryLookupFailed { name: String, status: u16 },

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("disk full while writing {}", path.display())]
    DiskFull { path: PathBuf },

    #[error("permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("archive entry escapes the install directory: {}", entry.display())]
    UnsafeArchiveEntry { entry: PathBuf },

    #[error("addon '{0}' is not installed")]
    NotInstalled(String),

    #[error("another operation on '{0}' is already in progress")]
    OperationInProgress(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn invalid_addon(name: impl Into<String>, reason: ValidationError) -> Self {
        Self::InvalidAddon {
            name: name.into(),
            reason,
        }
    }

    #[must_use]
    pub fn unsafe_entry(entry: &Path) -> Self {
        Self::UnsafeArchiveEntry {
            entry: entry.to_path_buf(),
        }
    }

    /// Classify a filesystem failure on `path`.
    ///
    /// Full disks and permission problems get their own variants so callers can
    /// tell the user something actionable; anything else stays a plain I/O error.
    #[must_use]
    pub fn fs(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::StorageFull => Self::DiskFull {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                context: path.display().to_string(),
                source,
            },
        }
    }

    /// Network-level failures that may succeed if the user simply tries again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable(_)
                | Self::Timeout(_)
                | Self::DownloadFailed(_)
                | Self::OperationInProgress(_)
        )
    }
}

impl jsaddons_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

jsaddons_common::impl_context!();
