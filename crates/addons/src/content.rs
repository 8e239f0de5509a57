use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use crate::{
    identifier::validate_identifier,
    store::AddonStore,
    types::{PACKAGE_DIR, SlotType},
};

/// Builds the script payload the host injects for a slot.
pub struct ContentAggregator {
    store: Arc<AddonStore>,
}

impl ContentAggregator {
    pub fn new(store: Arc<AddonStore>) -> Self {
        Self { store }
    }

    /// Concatenate the entry-point scripts of every enabled addon of `slot`,
    /// each wrapped in a `<script>` element, in enable order.
    ///
    /// Never fails: stale, invalid or unreadable addons are skipped.
    pub async fn aggregated_content(&self, slot: SlotType) -> String {
        let mut content = String::new();

        for id in self.store.state().enabled_names(slot).await {
            if validate_identifier(&id).is_err() {
                tracing::warn!(%id, "ignoring malformed enabled addon name");
                continue;
            }
            let Some(manifest) = self.store.read_manifest(&id).await else {
                continue;
            };
            if manifest.addon_type != slot {
                tracing::debug!(%id, expected = %slot, found = %manifest.addon_type, "enabled addon has another slot type");
                continue;
            }

            let package_dir = self.store.install_dir(&id).join(PACKAGE_DIR);
            let Some(script_path) = entry_point_path(&package_dir, &manifest.entry_point).await
            else {
                tracing::warn!(%id, entry_point = %manifest.entry_point, "entry point escapes the package directory");
                continue;
            };

            match tokio::fs::read_to_string(&script_path).await {
                Ok(script) => push_script(&mut content, &script),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(%id, path = %script_path.display(), "entry point missing");
                },
                Err(e) => {
                    tracing::warn!(%id, path = %script_path.display(), error = %e, "failed to read entry point");
                },
            }
        }

        content
    }
}

fn push_script(out: &mut String, script: &str) {
    out.push_str("<script>\n");
    out.push_str(script);
    if !script.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("</script>\n");
}

/// Resolve `entry_point` under `package_dir`, or `None` if it would leave it.
async fn entry_point_path(package_dir: &Path, entry_point: &str) -> Option<PathBuf> {
    let mut path = package_dir.to_path_buf();
    for component in Path::new(entry_point).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    // Symlinks inside the package may still point elsewhere.
    if let (Ok(real), Ok(base)) = (
        tokio::fs::canonicalize(&path).await,
        tokio::fs::canonicalize(package_dir).await,
    ) && !real.starts_with(&base)
    {
        return None;
    }
    Some(path)
}
