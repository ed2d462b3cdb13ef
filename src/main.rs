use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use orgdir::config::Config;
use orgdir::db;
use orgdir::service::{CancelSignal, ExpiredSubtreeCollector};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "-help" || arg == "--help") {
        println!("Usage: orgdir [OPTIONS]");
        println!("Options:");
        println!("  -config <path>  Path to configuration file (default: ./etc/orgdir.toml)");
        println!("  -help, --help   Print this help message");
        return Ok(());
    }

    let config_path = args
        .iter()
        .skip_while(|arg| arg.as_str() != "-config")
        .nth(1)
        .map(|s| s.to_string())
        .unwrap_or_else(|| "./etc/orgdir.toml".to_string());

    // Load configuration first (before logging init)
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        eprintln!("Could not load config file: {}, using defaults", e);
        Config::default()
    });

    // Initialize logging
    // Priority: RUST_LOG env var > config file > default "info"
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    info!("Starting orgdir expiry sweeper...");
    info!("Loading configuration from: {}", config_path);

    let db = db::init_database(&config.database).await.map_err(|e| {
        tracing::error!("Database initialization failed: {}", e);
        anyhow::anyhow!("Database initialization failed: {}", e)
    })?;

    let collector = ExpiredSubtreeCollector::new(db, config.sweep.retention_secs());
    let (cancel_tx, cancel) = CancelSignal::new();

    info!(
        "Expiry sweep every {}s, retention {} days",
        config.sweep.interval_secs, config.sweep.retention_days
    );
    let sweeper = tokio::spawn(collector.run(config.sweep.interval(), cancel));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping sweeper");
    let _ = cancel_tx.send(true);
    sweeper.await?;

    Ok(())
}
