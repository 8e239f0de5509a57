mod addon_commands;

use {
    clap::Parser,
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "jsaddons", version, about = "jsaddons: install and manage JavaScript addons")]
struct Cli {
    #[command(subcommand)]
    command: addon_commands::AddonCommand,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Custom config directory (overrides default ~/.config/jsaddons/).
    #[arg(long, global = true, env = "JSADDONS_CONFIG_DIR")]
    config_dir: Option<std::path::PathBuf>,
    /// Custom data directory holding installed addons and enabled state.
    #[arg(long, global = true, env = "JSADDONS_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // stdout is reserved for command output (`content`, `list --json`).
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(ref dir) = cli.config_dir {
        jsaddons_config::set_config_dir(dir.clone());
    }
    if let Some(ref dir) = cli.data_dir {
        jsaddons_config::set_data_dir(dir.clone());
    }

    let config = jsaddons_config::discover_and_load();
    let data_dir = jsaddons_config::data_dir();
    debug!(version = env!("CARGO_PKG_VERSION"), data_dir = %data_dir.display(), "jsaddons starting");

    addon_commands::handle(cli.command, &config, &data_dir).await
}
