//! Configuration loading, env substitution, and data directory resolution.
//!
//! Config files: `jsaddons.toml`, `jsaddons.yaml`, or `jsaddons.json`
//! Searched in `./` then `~/.config/jsaddons/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_config_dir, clear_data_dir, config_dir, data_dir, discover_and_load, load_config,
        set_config_dir, set_data_dir,
    },
    schema::{CompatibilityConfig, InstallConfig, JsAddonsConfig, RegistryConfig},
};
