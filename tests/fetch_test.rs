//! Candle store fallback chain: provider order, timeouts, malformed data and
//! the disk disaster cache.

mod common;

use chrono::Duration;
use common::{candles_from_closes, start, Script, ScriptedProvider};
use omen::config::FetchConfig;
use omen::error::EngineError;
use omen::services::{CandleStore, Clock, DiskCandles, FileCache, Freshness, ManualClock};
use omen::sources::CandleProvider;
use omen::types::Timeframe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_test::assert_err;

fn closes(n: usize) -> Vec<f64> {
    (0..n).map(|i| 100.0 + (i % 7) as f64).collect()
}

fn fast_config() -> FetchConfig {
    FetchConfig {
        min_spacing: std::time::Duration::ZERO,
        provider_timeout: std::time::Duration::from_secs(10),
        ..FetchConfig::default()
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("omen_fetch_{}_{}", name, uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn providers(list: &[Arc<ScriptedProvider>]) -> Vec<Arc<dyn CandleProvider>> {
    list.iter()
        .map(|p| p.clone() as Arc<dyn CandleProvider>)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_timeout_falls_through_without_retry() {
    let slow = Arc::new(ScriptedProvider::new("slow", Script::Hang));
    let backup = Arc::new(ScriptedProvider::serving(
        "backup",
        candles_from_closes(&closes(50), None),
    ));
    let clock = Arc::new(ManualClock::new(start()));
    let store = CandleStore::memory_only(
        providers(&[slow.clone(), backup.clone()]),
        clock,
        fast_config(),
    );

    let fetch = store.get_candles("btc", Timeframe::H1).await.unwrap();
    assert_eq!(fetch.provider, "backup");
    assert_eq!(fetch.freshness, Freshness::Fresh);
    assert_eq!(fetch.series.len(), 50);
    assert_eq!(slow.calls(), 1);
    assert_eq!(backup.calls(), 1);
}

#[tokio::test]
async fn test_short_series_is_rejected_as_malformed() {
    let short = Arc::new(ScriptedProvider::serving(
        "short",
        candles_from_closes(&closes(5), None),
    ));
    let good = Arc::new(ScriptedProvider::serving(
        "good",
        candles_from_closes(&closes(40), None),
    ));
    let clock = Arc::new(ManualClock::new(start()));
    let store = CandleStore::memory_only(providers(&[short.clone(), good]), clock, fast_config());

    let fetch = store.get_candles("ETH", Timeframe::H4).await.unwrap();
    assert_eq!(fetch.provider, "good");
    assert_eq!(short.calls(), 1);
}

#[tokio::test]
async fn test_unordered_candles_are_rejected() {
    let mut candles = candles_from_closes(&closes(30), None);
    candles.swap(3, 4);
    let shuffled = Arc::new(ScriptedProvider::serving("shuffled", candles));
    let clock = Arc::new(ManualClock::new(start()));
    let store = CandleStore::memory_only(providers(&[shuffled]), clock, fast_config());

    let err = assert_err!(store.get_candles("SOL", Timeframe::H1).await);
    assert!(matches!(err, EngineError::NoDataAvailable { .. }));
}

#[tokio::test]
async fn test_disk_backup_serves_when_providers_fail() {
    let dir = temp_dir("seeded");
    let clock = Arc::new(ManualClock::new(start()));
    let seeded = DiskCandles {
        provider: "binance_us".to_string(),
        candles: candles_from_closes(&closes(40), None),
    };
    FileCache::new(&dir)
        .set(
            &CandleStore::cache_key("BTC", Timeframe::H1),
            &seeded,
            start() - Duration::hours(2),
        )
        .unwrap();

    let down = Arc::new(ScriptedProvider::new("down", Script::Fail));
    let config = FetchConfig {
        cache_dir: dir.clone(),
        ..fast_config()
    };
    let store = CandleStore::new(providers(&[down.clone()]), clock.clone(), config);

    let fetch = store.get_candles("btc", Timeframe::H1).await.unwrap();
    assert_eq!(fetch.freshness, Freshness::StaleFallback);
    assert_eq!(fetch.provider, "binance_us");
    assert_eq!(fetch.series.len(), 40);
    match fetch.stale_error(clock.now()) {
        Some(EngineError::StaleFallback { age_secs, .. }) => assert_eq!(age_secs, 7200),
        other => panic!("expected stale fallback, got {:?}", other),
    }
    assert_eq!(down.calls(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_disk_backup_outside_disaster_window_is_ignored() {
    let dir = temp_dir("old");
    let clock = Arc::new(ManualClock::new(start()));
    let seeded = DiskCandles {
        provider: "kucoin".to_string(),
        candles: candles_from_closes(&closes(40), None),
    };
    FileCache::new(&dir)
        .set(
            &CandleStore::cache_key("ETH", Timeframe::D1),
            &seeded,
            start() - Duration::hours(25),
        )
        .unwrap();

    let config = FetchConfig {
        cache_dir: dir.clone(),
        ..fast_config()
    };
    let down = Arc::new(ScriptedProvider::new("down", Script::Fail));
    let store = CandleStore::new(providers(&[down]), clock, config);

    let err = assert_err!(store.get_candles("ETH", Timeframe::D1).await);
    assert!(matches!(
        err,
        EngineError::NoDataAvailable {
            timeframe: Timeframe::D1,
            ..
        }
    ));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_fresh_fetch_is_persisted_for_later_fallback() {
    let dir = temp_dir("persist");
    let clock = Arc::new(ManualClock::new(start()));
    let config = FetchConfig {
        cache_dir: dir.clone(),
        ..fast_config()
    };

    let good = Arc::new(ScriptedProvider::serving(
        "good",
        candles_from_closes(&closes(30), None),
    ));
    let first = CandleStore::new(providers(&[good]), clock.clone(), config.clone());
    first.get_candles("ADA", Timeframe::H1).await.unwrap();

    // Persistence runs on a blocking task.
    let cache = FileCache::new(&dir);
    let key = CandleStore::cache_key("ADA", Timeframe::H1);
    let mut persisted = false;
    for _ in 0..100 {
        if cache
            .get::<DiskCandles>(&key, Duration::hours(24), clock.now())
            .is_some()
        {
            persisted = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(persisted, "disk copy was never written");

    // A fresh process with every provider down still has data.
    let down = Arc::new(ScriptedProvider::new("down", Script::Fail));
    let second = CandleStore::new(providers(&[down]), clock, config);
    let fetch = second.get_candles("ADA", Timeframe::H1).await.unwrap();
    assert_eq!(fetch.freshness, Freshness::StaleFallback);
    assert_eq!(fetch.provider, "good");

    let _ = std::fs::remove_dir_all(&dir);
}
