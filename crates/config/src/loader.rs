use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    jsaddons_common::{Error, Result},
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::JsAddonsConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "jsaddons.toml",
    "jsaddons.yaml",
    "jsaddons.yml",
    "jsaddons.json",
];

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);
static DATA_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<JsAddonsConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::message(format!("failed to read {}: {e}", path.display())))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./jsaddons.{toml,yaml,yml,json}` (project-local)
/// 2. `<config dir>/jsaddons.{toml,yaml,yml,json}` (user-global)
///
/// Returns `JsAddonsConfig::default()` if no config file is found or the file
/// cannot be parsed.
pub fn discover_and_load() -> JsAddonsConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    JsAddonsConfig::default()
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "jsaddons")
}

/// Override the user-global config directory for this process.
pub fn set_config_dir(path: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

pub fn clear_config_dir() {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = None;
    }
}

/// Returns the user-global config directory (`~/.config/jsaddons/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(guard) = CONFIG_DIR_OVERRIDE.lock()
        && let Some(dir) = guard.as_ref()
    {
        return Some(dir.clone());
    }
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// Override the data directory (install root parent, enabled-state file).
pub fn set_data_dir(path: PathBuf) {
    if let Ok(mut guard) = DATA_DIR_OVERRIDE.lock() {
        *guard = Some(path);
    }
}

pub fn clear_data_dir() {
    if let Ok(mut guard) = DATA_DIR_OVERRIDE.lock() {
        *guard = None;
    }
}

/// Returns the data directory, falling back to `./.jsaddons` when the
/// platform has no home directory.
pub fn data_dir() -> PathBuf {
    if let Ok(guard) = DATA_DIR_OVERRIDE.lock()
        && let Some(dir) = guard.as_ref()
    {
        return dir.clone();
    }
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".jsaddons"))
}

fn parse_config(raw: &str, path: &Path) -> Result<JsAddonsConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let ctx = || format!("invalid config {}", path.display());

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse(ctx(), e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse(ctx(), e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse(ctx(), e)),
        _ => Err(Error::message(format!("unsupported config format: .{ext}"))),
    }
}
