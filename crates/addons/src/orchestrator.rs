//! Install, update and remove, tying registry, installer and store together.

use std::{
    collections::HashSet,
    fmt,
    path::Path,
    sync::{Arc, Mutex},
};

#[cfg(feature = "metrics")]
use std::time::Instant;

use jsaddons_config::JsAddonsConfig;

#[cfg(feature = "metrics")]
use metrics::{counter, histogram};

use crate::{
    content::ContentAggregator,
    error::{Error, Result, ValidationError},
    identifier::sanitize_identifier,
    install::ArchiveInstaller,
    registry::{self, HttpRegistryClient, RegistryClient},
    state::{EnabledAddonRegistry, STATE_FILE},
    store::AddonStore,
    types::{AddonManifest, InstalledAddon},
    validate::ManifestValidator,
};

#[cfg(feature = "metrics")]
pub mod metric_names {
    pub const INSTALLS_TOTAL: &str = "jsaddons_installs_total";
    pub const INSTALL_FAILURES_TOTAL: &str = "jsaddons_install_failures_total";
    pub const INSTALL_DURATION_SECONDS: &str = "jsaddons_install_duration_seconds";
    pub const REMOVALS_TOTAL: &str = "jsaddons_removals_total";
}

/// Where an install/update/remove currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    ResolvingMetadata,
    ValidatingManifest,
    Downloading,
    Extracting,
    Installed,
    Removing,
    Removed,
    Failed(String),
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Installed | Self::Removed | Self::Failed(_))
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::ResolvingMetadata => f.write_str("resolving metadata"),
            Self::ValidatingManifest => f.write_str("validating manifest"),
            Self::Downloading => f.write_str("downloading"),
            Self::Extracting => f.write_str("extracting"),
            Self::Installed => f.write_str("installed"),
            Self::Removing => f.write_str("removing"),
            Self::Removed => f.write_str("removed"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Receives every state transition of an operation.
pub trait ProgressSink: Send + Sync {
    fn on_state(&self, id: &str, state: &OperationState);
}

pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_state(&self, _id: &str, _state: &OperationState) {}
}

/// Reports transitions through `tracing`.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_state(&self, id: &str, state: &OperationState) {
        match state {
            OperationState::Failed(reason) => {
                tracing::warn!(%id, %reason, "addon operation failed")
            },
            s if s.is_terminal() => tracing::info!(%id, state = %s, "addon operation finished"),
            s => tracing::debug!(%id, state = %s, "addon operation progress"),
        }
    }
}

/// Releases the per-identifier lock when the operation ends.
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        set.remove(&self.id);
    }
}

/// Entry point for addon lifecycle operations.
pub struct AddonManager {
    registry: Arc<dyn RegistryClient>,
    validator: ManifestValidator,
    installer: ArchiveInstaller,
    store: Arc<AddonStore>,
    progress: Arc<dyn ProgressSink>,
    in_flight: Mutex<HashSet<String>>,
}

impl AddonManager {
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        validator: ManifestValidator,
        installer: ArchiveInstaller,
        store: Arc<AddonStore>,
    ) -> Self {
        Self {
            registry,
            validator,
            installer,
            store,
            progress: Arc::new(NoopProgress),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wire up the HTTP registry, installer and store under `data_dir`.
    pub async fn from_config(config: &JsAddonsConfig, data_dir: &Path) -> Result<Self> {
        let validator = ManifestValidator::from_config(&config.compatibility);
        let client = registry::http_client(&config.registry)?;
        let install_root = data_dir.join(&config.install.addons_dir_name);

        let state = EnabledAddonRegistry::open(data_dir.join(STATE_FILE)).await?;
        let store = Arc::new(AddonStore::new(
            install_root.clone(),
            validator.clone(),
            Arc::new(state),
        ));
        let installer = ArchiveInstaller::new(
            client.clone(),
            install_root,
            validator.clone(),
            config.install.max_archive_bytes,
        )
        .with_max_unpacked_bytes(config.install.max_unpacked_bytes);
        let registry = Arc::new(
            HttpRegistryClient::with_client(client, config.registry.url_template.clone())
                .with_request_timeout(config.registry.request_timeout()),
        );

        Ok(Self::new(registry, validator, installer, store))
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &Arc<AddonStore> {
        &self.store
    }

    pub fn content(&self) -> ContentAggregator {
        ContentAggregator::new(Arc::clone(&self.store))
    }

    /// Resolve the latest registry manifest without installing anything.
    pub async fn lookup(&self, raw_id: &str) -> Result<AddonManifest> {
        let id = sanitize_identifier(raw_id)?;
        registry::resolve(self.registry.as_ref(), &self.validator, &id).await
    }

    /// Install the latest version of `raw_id`, replacing any existing install.
    pub async fn install(&self, raw_id: &str) -> Result<InstalledAddon> {
        let id = sanitize_identifier(raw_id)?;
        let _guard = self.begin(&id)?;
        let result = self.fetch_and_install(&id).await;
        self.finish_install(&id, result)
    }

    /// Reinstall the latest version of an addon that is already installed.
    pub async fn update(&self, raw_id: &str) -> Result<InstalledAddon> {
        let id = sanitize_identifier(raw_id)?;
        let _guard = self.begin(&id)?;
        let result = match self.store.get(&id).await {
            Ok(Some(_)) => self.fetch_and_install(&id).await,
            Ok(None) => Err(Error::NotInstalled(id.clone())),
            Err(e) => Err(e),
        };
        self.finish_install(&id, result)
    }

    /// Uninstall `raw_id` and forget its enabled state.
    pub async fn remove(&self, raw_id: &str) -> Result<()> {
        let id = sanitize_identifier(raw_id)?;
        let _guard = self.begin(&id)?;

        self.report(&id, OperationState::Removing);
        match self.store.remove(&id).await {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(metric_names::REMOVALS_TOTAL).increment(1);
                self.report(&id, OperationState::Removed);
                Ok(())
            },
            Err(e) => {
                self.report(&id, OperationState::Failed(e.to_string()));
                Err(e)
            },
        }
    }

    fn begin(&self, id: &str) -> Result<InFlightGuard<'_>> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !set.insert(id.to_string()) {
            tracing::warn!(%id, "rejecting concurrent operation");
            return Err(Error::OperationInProgress(id.to_string()));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            id: id.to_string(),
        })
    }

    async fn fetch_and_install(&self, id: &str) -> Result<InstalledAddon> {
        #[cfg(feature = "metrics")]
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        counter!(metric_names::INSTALLS_TOTAL).increment(1);

        self.report(id, OperationState::ResolvingMetadata);
        let document = self.registry.fetch_latest(id).await?;

        self.report(id, OperationState::ValidatingManifest);
        let manifest = self
            .validator
            .validate_registry_document(&document)
            .map_err(|reason| Error::invalid_addon(id, reason))?;
        let Some(archive_url) = manifest.dist_archive_url.as_deref() else {
            return Err(Error::invalid_addon(id, ValidationError::MissingArchiveUrl));
        };
        if manifest.name != id {
            tracing::debug!(%id, name = %manifest.name, "registry manifest name differs from identifier");
        }

        self.report(id, OperationState::Downloading);
        let task = self.installer.download(archive_url, id).await?;

        self.report(id, OperationState::Extracting);
        let mut installed = self.installer.extract(task, id).await?;
        installed.enabled = self
            .store
            .state()
            .is_enabled(installed.manifest.addon_type, id)
            .await;

        #[cfg(feature = "metrics")]
        histogram!(metric_names::INSTALL_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        tracing::info!(%id, version = %installed.manifest.version, slot = %installed.manifest.addon_type, "installed addon");
        Ok(installed)
    }

    fn finish_install(
        &self,
        id: &str,
        result: Result<InstalledAddon>,
    ) -> Result<InstalledAddon> {
        match &result {
            Ok(_) => self.report(id, OperationState::Installed),
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(metric_names::INSTALL_FAILURES_TOTAL).increment(1);
                self.report(id, OperationState::Failed(e.to_string()));
            },
        }
        result
    }

    fn report(&self, id: &str, state: OperationState) {
        self.progress.on_state(id, &state);
    }
}
