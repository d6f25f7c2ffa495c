// =============================================================================
// pulsefeed — Main Entry Point
// =============================================================================
//
// Starts the feed supervisor for one configured symbol, logs the merged
// snapshot at the flip cadence, and shuts the session down cleanly on
// Ctrl+C.  The snapshot store is the integration point for any exposure
// surface (dashboard, REST relay) layered on top.

// ── Module declarations ──────────────────────────────────────────────────────
mod aggregator;
mod config;
mod decoder;
mod error;
mod poller;
mod store;
mod supervisor;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::FeedConfig;
use crate::store::SnapshotStore;
use crate::supervisor::FeedSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = FeedConfig::load("feed_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        FeedConfig::default()
    });
    config.apply_env_overrides();

    let symbol =
        std::env::var("PULSEFEED_SYMBOL").unwrap_or_else(|_| "BTCUSDT".to_string());

    info!(
        symbol = %symbol,
        flip_secs = config.flip_interval_secs,
        poll_secs = config.poll_interval_secs,
        "pulsefeed starting"
    );

    // ── 2. Build shared state & supervisor ───────────────────────────────
    let store = Arc::new(SnapshotStore::new());
    let supervisor = Arc::new(FeedSupervisor::new(config.clone(), store.clone())?);

    supervisor.start_feed(&symbol)?;

    // ── 3. Periodic snapshot telemetry ───────────────────────────────────
    let telemetry_store = store.clone();
    let telemetry_symbol = symbol.trim().to_ascii_uppercase();
    let flip_secs = config.flip_interval_secs;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(flip_secs));
        loop {
            interval.tick().await;
            let snap = telemetry_store.read(&telemetry_symbol).display();
            info!(
                symbol = %snap.symbol,
                price = %snap.price,
                delta = %snap.delta,
                funding = %snap.funding_rate,
                oi = %snap.open_interest,
                long_pct = %snap.long_pct,
                "snapshot"
            );
        }
    });

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping feed");
    supervisor.stop_feed(None);

    info!("pulsefeed shut down complete");
    Ok(())
}
