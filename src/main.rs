//! PolySignal trader - headless trading control plane
//!
//! Consumes scored scanner signals and manages risk-checked positions on a
//! prediction-market CLOB venue. Runs without a UI; observability is
//! structured logs on stdout.
//!
//! # Usage
//! ```sh
//! ENABLE_TRADING=true TRADING_DRY_RUN=true cargo run
//! ```
//!
//! # Environment Variables
//! - `ENABLE_TRADING` - master switch (default: false)
//! - `TRADING_DRY_RUN` - simulate instead of trading (default: true)
//! - `DATABASE_URL` - sqlite path (default: sqlite://data/polysignal.db)
//! - `CLOB_API_KEY` / `CLOB_API_SECRET` / `CLOB_PASSPHRASE` - venue
//!   credentials, required for live trading

use anyhow::Result;
use polysignal::application::system::Application;
use polysignal::config::Settings;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Setup logging (stdout only)
    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("PolySignal trader {} starting...", env!("CARGO_PKG_VERSION"));

    // Settings::from_env fails (non-zero exit) when live trading is
    // requested without CLOB credentials.
    let settings = Settings::from_env()?;
    info!(
        "Configuration loaded: trading={}, dry_run={}, db={}",
        settings.enable_trading, settings.dry_run, settings.database_url
    );
    if settings.is_live() {
        info!("Mode: LIVE trading");
    } else {
        info!("Mode: dry run (no orders reach the venue)");
    }

    let app = Application::build(settings).await?;
    app.start().await?;

    info!("Trader running. Press Ctrl+C to shutdown.");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");
    app.shutdown();

    Ok(())
}
