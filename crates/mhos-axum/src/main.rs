//! `mhos-server` - HTTP entry point for the control plane.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use mhos_axum::{ServerConfig, start_server};
use mhos_core::TelemetrySettings;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(name = "mhos-server", version, about = "MetaHuman OS process and telemetry server")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 4400)]
    port: u16,

    /// Data root (logs, run markers, templates).
    #[arg(long, env = "MHOS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// JSON file listing singleton servers.
    #[arg(long)]
    servers: Option<PathBuf>,

    /// Allowed CORS origin; repeat for several. All origins when absent.
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,
}

fn init_tracing() {
    // RUST_LOG wins over the default
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
        .ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config = match args.data_dir {
        Some(dir) => {
            let settings = TelemetrySettings::from_env()?;
            settings.validate()?;
            ServerConfig::for_data_root(dir).with_settings(settings)
        }
        None => ServerConfig::with_defaults()?,
    };
    config.port = args.port;
    if let Some(path) = args.servers {
        config = config.with_servers_file(path);
    }
    if !args.allow_origins.is_empty() {
        config = config.with_allowed_origins(args.allow_origins);
    }

    start_server(config).await
}
