//! SOS Alert - personal safety alert server
//!
//! Serves the SOS page, listens for button and voice triggers, and calls
//! and texts the emergency contact when an alert is raised.

use anyhow::{Context, Result};
use clap::Parser;
use sos_alert::config::{config_path, Config};
use sos_alert::server::{self, AppState};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 0.0.0.0:8501
    #[arg(short, long)]
    bind: Option<String>,

    /// Write the effective config to the config path and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(config_path);
    let mut config = Config::load_from(&path)
        .with_context(|| format!("failed to read config {:?}", path))?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    // Setup logging: RUST_LOG wins, then --verbose, then the config level
    let default_level = if args.verbose {
        "debug".to_string()
    } else {
        config.log_level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🆘 SOS Alert v{} starting...", env!("CARGO_PKG_VERSION"));

    if args.write_config {
        config.save_to(&path)?;
        info!("💾 Config written to {:?}", path);
        return Ok(());
    }

    if !config.geocoder_enabled {
        warn!("Reverse geocoding disabled, the fallback address will be used");
    }
    info!("   Settings file: {}", config.settings_path);

    let state = AppState::from_config(config)?;
    server::serve(state).await
}
