//! lamco-screen-manager - Screen Session Manager
//!
//! Entry point for the daemon binary.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use lamco_screen_manager::config::Config;
use lamco_screen_manager::hotplug::spawn_hotplug_pump;
use lamco_screen_manager::logging::{init_logging, LogSink};
use lamco_screen_manager::manager::ScreenSessionManager;

/// Command-line arguments for lamco-screen-manager
#[derive(Parser, Debug)]
#[command(name = "lamco-screen-manager")]
#[command(version, about = "Screen session topology and notification core", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        env = "SCREEN_MANAGER_CONFIG",
        default_value = "/etc/lamco-screen-manager/config.toml"
    )]
    pub config: String,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Validate the configuration file and exit
    #[arg(long)]
    pub check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.check_config {
        Config::load(&args.config)?;
        println!("{}: OK", args.config);
        return Ok(());
    }

    let (config, load_error) = match Config::load(&args.config) {
        Ok(config) => (config, None),
        Err(e) => (Config::default_config(), Some(e)),
    };

    let log_level = match args.verbose {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    };
    let config = config.with_overrides(log_level, args.log_format.as_deref());
    config.validate()?;

    let sink = match (&args.log_file, &config.logging.log_dir) {
        (Some(file), _) => LogSink::File(file),
        (None, Some(dir)) => LogSink::Directory(dir),
        (None, None) => LogSink::Stdout,
    };
    let _log_guard = init_logging(&config.logging.level, &config.logging.format, sink)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-screen-manager v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {}", env!("SCREEN_MANAGER_BUILD_DATE"));
    info!("  Commit: {}", env!("SCREEN_MANAGER_COMMIT"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    match load_error {
        Some(e) => warn!("Failed to load config: {:#}, using defaults", e),
        None => info!("Configuration loaded from {}", args.config),
    }
    tracing::debug!("Config: {:?}", config);

    let core = Arc::new(ScreenSessionManager::new(&config));
    core.log_summary();

    // The hardware layer holds the sender; dropping it stops the pump
    let (hotplug_tx, hotplug_rx) = mpsc::channel(32);
    let pump = spawn_hotplug_pump(core.clone(), hotplug_rx);

    info!("Screen core running, press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    drop(hotplug_tx);
    match pump.await {
        Ok(stats) => info!(
            "Hotplug pump stopped ({} events, {} failed)",
            stats.received, stats.failed
        ),
        Err(e) => warn!("Hotplug pump panicked: {}", e),
    }

    core.log_summary();
    info!("lamco-screen-manager shut down");
    Ok(())
}
