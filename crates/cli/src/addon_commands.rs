//! CLI commands for addon management.

use std::{path::Path, sync::Arc};

use {
    anyhow::{Result, bail},
    clap::Subcommand,
    jsaddons_config::JsAddonsConfig,
    jsaddons_core::{
        AddonManager, AddonManifest, CatalogSort, InstalledAddon, LogProgress, SlotType,
        sanitize_identifier,
    },
};

#[derive(Subcommand)]
pub enum AddonCommand {
    /// Install the latest version of an addon from the registry.
    Install {
        /// Package name; a pasted `npm i <name>` also works.
        name: String,
    },
    /// Update an installed addon to the latest version.
    Update { name: String },
    /// Uninstall an addon and forget its enabled state.
    Remove { name: String },
    /// List installed addons.
    List {
        /// Only addons for this slot (reviewer, note_editor).
        #[arg(long, value_parser = parse_slot)]
        slot: Option<SlotType>,
        /// Sort by directory (dir) or package name (name).
        #[arg(long, default_value = "dir", value_parser = parse_sort)]
        sort: CatalogSort,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Enable an addon for a slot.
    Enable {
        #[arg(value_parser = parse_slot)]
        slot: SlotType,
        name: String,
    },
    /// Disable an addon for a slot.
    Disable {
        #[arg(value_parser = parse_slot)]
        slot: SlotType,
        name: String,
    },
    /// Print the aggregated script payload for a slot.
    Content {
        #[arg(value_parser = parse_slot)]
        slot: SlotType,
    },
    /// Show details about an addon.
    Info {
        name: String,
        /// Query the registry instead of the local install.
        #[arg(long)]
        remote: bool,
    },
}

fn parse_slot(s: &str) -> std::result::Result<SlotType, String> {
    s.parse().map_err(|e: jsaddons_core::Error| e.to_string())
}

fn parse_sort(s: &str) -> std::result::Result<CatalogSort, String> {
    s.parse().map_err(|e: jsaddons_core::Error| e.to_string())
}

pub async fn handle(
    command: AddonCommand,
    config: &JsAddonsConfig,
    data_dir: &Path,
) -> Result<()> {
    let manager = AddonManager::from_config(config, data_dir)
        .await?
        .with_progress(Arc::new(LogProgress));

    match command {
        AddonCommand::Install { name } => {
            let addon = manager.install(&name).await?;
            println!(
                "Installed {} {} ({})",
                addon.id, addon.manifest.version, addon.manifest.addon_type
            );
            if !addon.enabled {
                println!(
                    "Enable it with: jsaddons enable {} {}",
                    addon.manifest.addon_type, addon.id
                );
            }
        },
        AddonCommand::Update { name } => {
            let addon = manager.update(&name).await?;
            println!("Updated {} to {}", addon.id, addon.manifest.version);
        },
        AddonCommand::Remove { name } => {
            manager.remove(&name).await?;
            println!("Removed {name}");
        },
        AddonCommand::List { slot, sort, json } => {
            let addons = match slot {
                Some(slot) => manager.store().scan_sorted(slot, sort).await?,
                None => {
                    let mut all = Vec::new();
                    for slot in SlotType::ALL {
                        all.extend(manager.store().scan_sorted(slot, sort).await?);
                    }
                    all
                },
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&addons)?);
            } else if addons.is_empty() {
                println!("No addons installed.");
                println!(
                    "Addons are installed into {}",
                    manager.store().root().display()
                );
            } else {
                for addon in &addons {
                    print_row(addon);
                }
            }
        },
        AddonCommand::Enable { slot, name } => {
            let id = sanitize_identifier(&name)?;
            manager.store().enable(slot, &id).await?;
            println!("Enabled {id} for {slot}");
        },
        AddonCommand::Disable { slot, name } => {
            let id = sanitize_identifier(&name)?;
            manager.store().disable(slot, &id).await?;
            println!("Disabled {id} for {slot}");
        },
        AddonCommand::Content { slot } => {
            print!("{}", manager.content().aggregated_content(slot).await);
        },
        AddonCommand::Info { name, remote } => {
            if remote {
                let manifest = manager.lookup(&name).await?;
                print_manifest(&manifest);
                if let Some(ref url) = manifest.dist_archive_url {
                    println!("Archive:     {url}");
                }
            } else {
                let id = sanitize_identifier(&name)?;
                let Some(addon) = manager.store().get(&id).await? else {
                    bail!("addon '{id}' is not installed");
                };
                print_manifest(&addon.manifest);
                println!("Enabled:     {}", addon.enabled);
                println!("Path:        {}", addon.path.display());
            }
        },
    }

    Ok(())
}

fn print_row(addon: &InstalledAddon) {
    let status = if addon.enabled {
        "✓"
    } else {
        " "
    };
    println!(
        "  {status} {id} {version} [{slot}] {name}",
        id = addon.id,
        version = addon.manifest.version,
        slot = addon.manifest.addon_type,
        name = addon.manifest.name,
    );
}

fn print_manifest(manifest: &AddonManifest) {
    println!("Name:        {}", manifest.name);
    println!("Version:     {}", manifest.version);
    println!("Author:      {}", manifest.author);
    println!("Homepage:    {}", manifest.homepage);
    println!("Slot:        {}", manifest.addon_type);
    println!("API version: {}", manifest.api_version);
    println!("Entry point: {}", manifest.entry_point);
}
