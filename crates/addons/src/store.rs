use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::{
    error::{Error, Result},
    identifier::{sanitize_identifier, validate_identifier},
    state::EnabledAddonRegistry,
    types::{AddonManifest, InstalledAddon, SlotType, manifest_path},
    validate::ManifestValidator,
};

/// Catalog ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogSort {
    #[default]
    DirectoryName,
    AddonName,
}

impl FromStr for CatalogSort {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dir" | "directory" => Ok(Self::DirectoryName),
            "name" => Ok(Self::AddonName),
            other => Err(Error::Message(format!(
                "unknown sort '{other}' (expected dir or name)"
            ))),
        }
    }
}

/// Installed addons on disk plus their enabled state.
pub struct AddonStore {
    root: PathBuf,
    validator: ManifestValidator,
    state: Arc<EnabledAddonRegistry>,
}

impl AddonStore {
    pub fn new(
        root: PathBuf,
        validator: ManifestValidator,
        state: Arc<EnabledAddonRegistry>,
    ) -> Self {
        Self {
            root,
            validator,
            state,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> &Arc<EnabledAddonRegistry> {
        &self.state
    }

    pub fn install_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Valid addons of `slot`, ordered by directory name.
    pub async fn scan(&self, slot: SlotType) -> Result<Vec<InstalledAddon>> {
        self.scan_sorted(slot, CatalogSort::DirectoryName).await
    }

    pub async fn scan_sorted(
        &self,
        slot: SlotType,
        sort: CatalogSort,
    ) -> Result<Vec<InstalledAddon>> {
        let mut addons: Vec<InstalledAddon> = self
            .scan_all()
            .await?
            .into_iter()
            .filter(|a| a.manifest.addon_type == slot)
            .collect();
        sort_catalog(&mut addons, sort);
        Ok(addons)
    }

    /// Every valid installed addon regardless of slot, ordered by directory name.
    pub async fn scan_all(&self) -> Result<Vec<InstalledAddon>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::fs(&self.root, e)),
        };

        let mut addons = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::fs(&self.root, e))?
        {
            let file_name = entry.file_name();
            let Some(id) = file_name.to_str() else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            if !entry.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }
            if let Some(addon) = self.load(id).await {
                addons.push(addon);
            }
        }

        sort_catalog(&mut addons, CatalogSort::DirectoryName);
        Ok(addons)
    }

    /// A single installed addon, if present and valid.
    pub async fn get(&self, id: &str) -> Result<Option<InstalledAddon>> {
        validate_identifier(id)?;
        Ok(self.load(id).await)
    }

    /// Enable `name` for `slot`. The name is normalized the same way install
    /// identifiers are, so `" npm i foo"` enables `foo`.
    pub async fn enable(&self, slot: SlotType, name: &str) -> Result<()> {
        let name = sanitize_identifier(name)?;
        self.state.enable(slot, &name).await?;
        tracing::info!(%slot, %name, "addon enabled");
        Ok(())
    }

    pub async fn disable(&self, slot: SlotType, name: &str) -> Result<()> {
        let name = sanitize_identifier(name)?;
        self.state.disable(slot, &name).await?;
        tracing::info!(%slot, %name, "addon disabled");
        Ok(())
    }

    /// Delete the install directory, then forget its enabled state.
    ///
    /// A missing directory is not an error; state is still cleared.
    pub async fn remove(&self, name: &str) -> Result<()> {
        validate_identifier(name)?;
        let dir = self.install_dir(name);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::info!(%name, path = %dir.display(), "addon directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%name, "no install directory to remove");
            },
            Err(e) => return Err(Error::fs(&dir, e)),
        }
        self.state.remove_all(name).await
    }

    async fn load(&self, id: &str) -> Option<InstalledAddon> {
        let manifest = self.read_manifest(id).await?;
        let enabled = self.state.is_enabled(manifest.addon_type, id).await;
        Some(InstalledAddon {
            id: id.to_string(),
            path: self.install_dir(id),
            manifest,
            enabled,
        })
    }

    /// Read and validate the on-disk manifest for `id`. Anything unreadable or
    /// invalid is logged and treated as absent.
    pub(crate) async fn read_manifest(&self, id: &str) -> Option<AddonManifest> {
        let path = manifest_path(&self.install_dir(id));
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(%id, "no manifest, skipping");
                return None;
            },
            Err(e) => {
                tracing::warn!(%id, path = %path.display(), error = %e, "failed to read addon manifest");
                return None;
            },
        };
        match self.validator.validate_str(&text) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(%id, error = %e, "ignoring invalid installed addon");
                None
            },
        }
    }
}

fn sort_catalog(addons: &mut [InstalledAddon], sort: CatalogSort) {
    match sort {
        CatalogSort::DirectoryName => addons.sort_by(|a, b| a.id.cmp(&b.id)),
        CatalogSort::AddonName => addons.sort_by(|a, b| {
            a.manifest
                .name
                .cmp(&b.manifest.name)
                .then_with(|| a.id.cmp(&b.id))
        }),
    }
}
