use omen::config::Config;
use omen::services::{
    CandleStore, MemorySignalRepository, SignalEngine, SignalRepository, SqliteSignalRepository,
    SystemClock,
};
use omen::sources::default_providers;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "omen=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        "Starting Omen: tracking {} (primary {}, HTF {})",
        config.tracked_symbols.join(", "),
        config.primary_timeframe,
        config.htf_timeframe
    );

    let clock = Arc::new(SystemClock);
    let providers = default_providers(&config.fetch);
    let candles = Arc::new(CandleStore::new(
        providers,
        clock.clone(),
        config.fetch.clone(),
    ));
    info!("Candle providers: {}", candles.provider_names().join(" -> "));

    let pruned = candles.prune_disk().await;
    if pruned > 0 {
        info!("Removed {} expired candle backups", pruned);
    }

    let repository: Arc<dyn SignalRepository> = match &config.state.db_path {
        Some(path) => {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Arc::new(SqliteSignalRepository::new(path)?)
        }
        None => {
            warn!("SIGNAL_DB_PATH is empty, signal state will not survive restarts");
            Arc::new(MemorySignalRepository::new())
        }
    };

    let engine = Arc::new(SignalEngine::new(config, candles, repository, clock));
    match engine.load_state().await {
        Ok(count) => info!("Restored {} active signals", count),
        Err(e) => error!("Failed to restore signal state: {}", e),
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down, waiting for the current cycle");
    let _ = shutdown_tx.send(());
    runner.await?;

    for signal in engine.get_active_signals().await {
        info!(
            "{} {} @ {:.2} ({:.1}%, expires {})",
            signal.symbol, signal.bias, signal.entry_price, signal.confidence, signal.expires_at
        );
    }

    Ok(())
}
