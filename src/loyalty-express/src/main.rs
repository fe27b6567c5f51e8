//! Loyalty Express — points ledger and tier engine daemon.
//!
//! Main entry point that wires the ledger components together and runs the
//! scheduled expiry sweep. The HTTP layer, admin tooling, and order/booking
//! completion workflows are external collaborators that call into the
//! library crates.

use clap::Parser;
use loyalty_core::config::AppConfig;
use loyalty_expiry::ExpiryScanner;
use loyalty_ledger::AccountManager;
use loyalty_rewards::RewardCatalog;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "loyalty-express")]
#[command(about = "Loyalty points ledger and tier engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LOYALTY_EXPRESS__NODE_ID")]
    node_id: Option<String>,

    /// Seconds between expiry sweeps (overrides config)
    #[arg(long, env = "LOYALTY_EXPRESS__EXPIRY__SWEEP_INTERVAL_SECS")]
    sweep_interval: Option<u64>,

    /// Run a single expiry sweep and exit
    #[arg(long, default_value_t = false)]
    sweep_once: bool,

    /// Seed the demo reward catalog on startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loyalty_express=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("Loyalty Express starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(interval) = cli.sweep_interval {
        config.expiry.sweep_interval_secs = interval;
    }

    info!(
        node_id = %config.node_id,
        signup_bonus = config.ledger.signup_bonus_points,
        expiry_days = config.ledger.points_expiry_days,
        sweep_interval_secs = config.expiry.sweep_interval_secs,
        "Configuration loaded"
    );

    let accounts = Arc::new(AccountManager::new(&config.ledger));
    let rewards = Arc::new(RewardCatalog::new(accounts.clone()));
    if cli.seed_demo {
        rewards.seed_demo_rewards();
    }

    let scanner = Arc::new(ExpiryScanner::new(accounts.clone()));

    if cli.sweep_once {
        let report = scanner.sweep();
        info!(
            expired = report.expired_count,
            failed = report.failed_count,
            "One-off sweep complete"
        );
        return Ok(());
    }

    // Spawn the recurring expiry sweep
    if config.expiry.enabled {
        let interval = std::time::Duration::from_secs(config.expiry.sweep_interval_secs);
        scanner.clone().spawn(interval);
        info!(interval_secs = config.expiry.sweep_interval_secs, "Expiry sweep scheduled");
    } else {
        info!("Expiry sweep disabled");
    }

    info!("Loyalty Express is ready");

    // Block until shutdown
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    Ok(())
}
