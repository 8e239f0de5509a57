use std::path::{Path, PathBuf};

use {
    serde::{Deserialize, Serialize},
    tokio::sync::RwLock,
};

use crate::{
    error::{Error, Result},
    types::SlotType,
};

pub const STATE_FILE: &str = "enabled-addons.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnabledEntry {
    pub slot: SlotType,
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct EnabledState {
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    entries: Vec<EnabledEntry>,
}

fn default_version() -> u32 {
    1
}

impl EnabledState {
    fn position(&self, slot: SlotType, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.slot == slot && e.name == name)
    }

    /// Returns `true` if anything changed.
    fn set(&mut self, slot: SlotType, name: &str, enabled: bool) -> bool {
        match self.position(slot, name) {
            Some(i) if self.entries[i].enabled == enabled => false,
            Some(i) => {
                self.entries[i].enabled = enabled;
                true
            },
            None => {
                self.entries.push(EnabledEntry {
                    slot,
                    name: name.to_string(),
                    enabled,
                });
                true
            },
        }
    }
}

/// Persisted `(slot, name) -> enabled` mapping.
///
/// Entries keep the order in which they were first recorded; toggling an
/// entry does not move it. Every mutation is written to disk before the
/// in-memory copy is replaced, so a failed write leaves both unchanged.
pub struct EnabledAddonRegistry {
    path: PathBuf,
    state: RwLock<EnabledState>,
}

impl EnabledAddonRegistry {
    /// Default location: `<data-dir>/enabled-addons.json`.
    pub fn default_path() -> PathBuf {
        jsaddons_config::data_dir().join(STATE_FILE)
    }

    /// Load the registry from `path`, starting empty if the file is missing.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EnabledState {
                version: default_version(),
                entries: Vec::new(),
            },
            Err(e) => return Err(Error::fs(&path, e)),
        };
        tracing::debug!(path = %path.display(), entries = state.entries.len(), "loaded enabled addon state");
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn enable(&self, slot: SlotType, name: &str) -> Result<()> {
        self.update(|state| state.set(slot, name, true)).await
    }

    pub async fn disable(&self, slot: SlotType, name: &str) -> Result<()> {
        self.update(|state| state.set(slot, name, false)).await
    }

    pub async fn is_enabled(&self, slot: SlotType, name: &str) -> bool {
        let state = self.state.read().await;
        state
            .position(slot, name)
            .is_some_and(|i| state.entries[i].enabled)
    }

    /// Enabled names for `slot`, in insertion order. May include names that
    /// are no longer installed.
    pub async fn enabled_names(&self, slot: SlotType) -> Vec<String> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .filter(|e| e.slot == slot && e.enabled)
            .map(|e| e.name.clone())
            .collect()
    }

    pub async fn entries(&self) -> Vec<EnabledEntry> {
        self.state.read().await.entries.clone()
    }

    /// Drop every entry for `name`, across all slots.
    pub async fn remove_all(&self, name: &str) -> Result<()> {
        self.update(|state| {
            let before = state.entries.len();
            state.entries.retain(|e| e.name != name);
            state.entries.len() != before
        })
        .await
    }

    async fn update(&self, mutate: impl FnOnce(&mut EnabledState) -> bool) -> Result<()> {
        let mut guard = self.state.write().await;
        let mut next = guard.clone();
        if !mutate(&mut next) {
            return Ok(());
        }
        self.save(&next).await?;
        *guard = next;
        Ok(())
    }

    /// Atomic write via temp file + rename.
    async fn save(&self, state: &EnabledState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::fs(parent, e))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| Error::fs(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| Error::fs(&self.path, e))?;
        Ok(())
    }
}
