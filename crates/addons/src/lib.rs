//! Addon package management for a host that injects third-party JavaScript
//! into its reviewer and note editor views.
//!
//! Addons are npm packages tagged with a marker keyword and declaring the
//! host API version they target. They are resolved from a registry, unpacked
//! under `<data-dir>/addons/<id>/package/`, enabled per slot, and finally
//! concatenated into a single `<script>` payload for the renderer.

pub mod content;
pub mod error;
pub mod identifier;
pub mod install;
pub mod orchestrator;
pub mod registry;
pub mod state;
pub mod store;
pub mod types;
pub mod validate;

pub use {
    content::ContentAggregator,
    error::{Error, Result, ValidationError},
    identifier::{sanitize_identifier, validate_identifier},
    install::ArchiveInstaller,
    orchestrator::{AddonManager, LogProgress, NoopProgress, OperationState, ProgressSink},
    registry::{HttpRegistryClient, RegistryClient},
    state::{EnabledAddonRegistry, EnabledEntry},
    store::{AddonStore, CatalogSort},
    types::{AddonManifest, DownloadStatus, DownloadTask, InstalledAddon, SlotType},
    validate::ManifestValidator,
};
