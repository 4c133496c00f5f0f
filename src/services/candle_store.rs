//! Candle store with multi-provider fallback.
//!
//! Lookup order for one (symbol, timeframe):
//! 1. memory entry younger than the timeframe TTL
//! 2. providers in priority order, each throttled and time-boxed, first valid series wins
//! 3. expired memory entry younger than a multiple of the TTL
//! 4. disk copy inside the disaster window
//!
//! Steps 3 and 4 are flagged as stale so callers can mark their output provisional.

use super::clock::Clock;
use super::file_cache::FileCache;
use super::throttle::provider_limiter;
use crate::config::FetchConfig;
use crate::error::{EngineError, Result};
use crate::sources::CandleProvider;
use crate::types::{Candle, CandleSeries, Timeframe};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use governor::DefaultDirectRateLimiter;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a series was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Fetched from a provider during this call.
    Fresh,
    /// Served from memory within its TTL.
    Cached,
    /// Served from an expired memory entry or the disk copy.
    StaleFallback,
}

/// Result of a candle lookup.
#[derive(Debug, Clone)]
pub struct CandleFetch {
    pub series: CandleSeries,
    pub freshness: Freshness,
    /// Provider that originally supplied the data.
    pub provider: String,
    pub fetched_at: DateTime<Utc>,
}

impl CandleFetch {
    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::StaleFallback
    }

    /// The stale-data condition as an error value, for logging.
    pub fn stale_error(&self, now: DateTime<Utc>) -> Option<EngineError> {
        self.is_stale().then(|| EngineError::StaleFallback {
            symbol: self.series.symbol().to_string(),
            timeframe: self.series.timeframe(),
            age_secs: (now - self.fetched_at).num_seconds(),
        })
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    series: CandleSeries,
    provider: String,
    fetched_at: DateTime<Utc>,
}

/// What lands on disk under [`CandleStore::cache_key`]; re-validated on load.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiskCandles {
    pub provider: String,
    pub candles: Vec<Candle>,
}

struct ThrottledProvider {
    provider: Arc<dyn CandleProvider>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

/// Shared candle store. One instance serves every symbol and timeframe.
pub struct CandleStore {
    providers: Vec<ThrottledProvider>,
    memory: DashMap<String, CacheEntry>,
    disk: Option<FileCache>,
    clock: Arc<dyn Clock>,
    config: FetchConfig,
}

impl CandleStore {
    /// Build a store over `providers` (priority order) with a disk cache in
    /// `config.cache_dir`.
    pub fn new(
        providers: Vec<Arc<dyn CandleProvider>>,
        clock: Arc<dyn Clock>,
        config: FetchConfig,
    ) -> Self {
        let disk = FileCache::new(config.cache_dir.clone());
        Self::build(providers, clock, config, Some(disk))
    }

    /// Build a store without disk persistence.
    pub fn memory_only(
        providers: Vec<Arc<dyn CandleProvider>>,
        clock: Arc<dyn Clock>,
        config: FetchConfig,
    ) -> Self {
        Self::build(providers, clock, config, None)
    }

    fn build(
        providers: Vec<Arc<dyn CandleProvider>>,
        clock: Arc<dyn Clock>,
        config: FetchConfig,
        disk: Option<FileCache>,
    ) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| ThrottledProvider {
                provider,
                limiter: provider_limiter(config.min_spacing),
            })
            .collect();

        Self {
            providers,
            memory: DashMap::new(),
            disk,
            clock,
            config,
        }
    }

    /// Key used for memory and disk entries.
    pub fn cache_key(symbol: &str, timeframe: Timeframe) -> String {
        format!("{}:{}", symbol.trim().to_uppercase(), timeframe)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider.name()).collect()
    }

    /// Get candles for a symbol and timeframe, falling back as far as needed.
    pub async fn get_candles(&self, symbol: &str, timeframe: Timeframe) -> Result<CandleFetch> {
        let symbol = symbol.trim().to_uppercase();
        let key = Self::cache_key(&symbol, timeframe);
        let now = self.clock.now();
        let ttl = ttl_of(timeframe);

        if let Some(entry) = self.memory.get(&key) {
            if now - entry.fetched_at < ttl {
                debug!("Cache hit for {} ({})", key, entry.provider);
                return Ok(CandleFetch {
                    series: entry.series.clone(),
                    freshness: Freshness::Cached,
                    provider: entry.provider.clone(),
                    fetched_at: entry.fetched_at,
                });
            }
        }

        for slot in &self.providers {
            let name = slot.provider.name();
            match self.fetch_from(slot, &symbol, timeframe).await {
                Ok(series) => {
                    debug!("{} served {} candles for {}", name, series.len(), key);
                    let fetched_at = self.clock.now();
                    self.store(&key, &series, name, fetched_at);
                    return Ok(CandleFetch {
                        series,
                        freshness: Freshness::Fresh,
                        provider: name.to_string(),
                        fetched_at,
                    });
                }
                Err(e) => warn!("{} failed for {}: {}", name, key, e),
            }
        }

        self.fallback(&symbol, timeframe, &key, now).await
    }

    async fn fetch_from(
        &self,
        slot: &ThrottledProvider,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<CandleSeries> {
        if let Some(limiter) = &slot.limiter {
            limiter.until_ready().await;
        }

        let name = slot.provider.name();
        let fetch = slot
            .provider
            .fetch(symbol, timeframe, self.config.candle_limit);
        let candles = tokio::time::timeout(self.config.provider_timeout, fetch)
            .await
            .map_err(|_| EngineError::Timeout {
                provider: name.to_string(),
                timeout_ms: self.config.provider_timeout.as_millis() as u64,
            })??;

        CandleSeries::new(symbol, timeframe, candles, self.config.min_candles)
    }

    fn store(&self, key: &str, series: &CandleSeries, provider: &str, fetched_at: DateTime<Utc>) {
        self.memory.insert(
            key.to_string(),
            CacheEntry {
                series: series.clone(),
                provider: provider.to_string(),
                fetched_at,
            },
        );

        let Some(disk) = self.disk.clone() else {
            return;
        };
        let key = key.to_string();
        let payload = DiskCandles {
            provider: provider.to_string(),
            candles: series.candles().to_vec(),
        };
        tokio::task::spawn_blocking(move || {
            if let Err(e) = disk.set(&key, &payload, fetched_at) {
                error!("Failed to persist candles for {}: {}", key, e);
            }
        });
    }

    async fn fallback(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<CandleFetch> {
        let stale_window = ttl_of(timeframe) * self.config.stale_ttl_multiplier as i32;
        if let Some(entry) = self.memory.get(key) {
            if now - entry.fetched_at < stale_window {
                info!("Using expired memory cache for {}", key);
                return Ok(CandleFetch {
                    series: entry.series.clone(),
                    freshness: Freshness::StaleFallback,
                    provider: entry.provider.clone(),
                    fetched_at: entry.fetched_at,
                });
            }
        }

        if let Some(disk) = self.disk.clone() {
            let window = Duration::from_std(self.config.disaster_window)
                .unwrap_or_else(|_| Duration::hours(24));
            let disk_key = key.to_string();
            let loaded = tokio::task::spawn_blocking(move || {
                disk.get::<DiskCandles>(&disk_key, window, now)
            })
            .await
            .ok()
            .flatten();

            if let Some((payload, stored_at)) = loaded {
                match CandleSeries::new(symbol, timeframe, payload.candles, self.config.min_candles)
                {
                    Ok(series) => {
                        info!("Using disk backup for {}", key);
                        return Ok(CandleFetch {
                            series,
                            freshness: Freshness::StaleFallback,
                            provider: payload.provider,
                            fetched_at: stored_at,
                        });
                    }
                    Err(e) => warn!("Discarding disk backup for {}: {}", key, e),
                }
            }
        }

        Err(EngineError::NoDataAvailable {
            symbol: symbol.to_string(),
            timeframe,
        })
    }

    /// Drop every memory entry for a symbol.
    pub fn invalidate(&self, symbol: &str) {
        let prefix = format!("{}:", symbol.trim().to_uppercase());
        self.memory.retain(|k, _| !k.starts_with(&prefix));
    }

    pub fn clear(&self) {
        self.memory.clear();
    }

    /// Delete disk copies older than the disaster window.
    pub async fn prune_disk(&self) -> usize {
        let Some(disk) = self.disk.clone() else {
            return 0;
        };
        let window =
            Duration::from_std(self.config.disaster_window).unwrap_or_else(|_| Duration::hours(24));
        let now = self.clock.now();
        tokio::task::spawn_blocking(move || disk.cleanup(window, now))
            .await
            .unwrap_or(0)
    }
}

fn ttl_of(timeframe: Timeframe) -> Duration {
    Duration::from_std(timeframe.cache_ttl()).unwrap_or_else(|_| Duration::minutes(10))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use chrono::TimeZone;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        candles: Vec<Candle>,
    }

    impl CandleProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn fetch<'a>(
            &'a self,
            _symbol: &'a str,
            _timeframe: Timeframe,
            _limit: usize,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>> {
            Box::pin(async move {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(self.candles.clone())
                } else {
                    Err(EngineError::provider("counting", "down"))
                }
            })
        }
    }

    fn candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                timestamp: i as i64 * 3_600_000,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 5.0,
            })
            .collect()
    }

    fn fixture() -> (CandleStore, Arc<CountingProvider>, Arc<ManualClock>) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            candles: candles(30),
        });
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let config = FetchConfig {
            min_spacing: std::time::Duration::ZERO,
            ..FetchConfig::default()
        };
        let store = CandleStore::memory_only(vec![provider.clone()], clock.clone(), config);
        (store, provider, clock)
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(CandleStore::cache_key("btc", Timeframe::H4), "BTC:4h");
    }

    #[tokio::test]
    async fn test_memory_hit_within_ttl() {
        let (store, provider, clock) = fixture();

        let first = store.get_candles("btc", Timeframe::H1).await.unwrap();
        assert_eq!(first.freshness, Freshness::Fresh);

        clock.advance(Duration::minutes(29));
        let second = store.get_candles("BTC", Timeframe::H1).await.unwrap();
        assert_eq!(second.freshness, Freshness::Cached);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_memory_reused_when_providers_fail() {
        let (store, _provider, clock) = fixture();
        store.get_candles("btc", Timeframe::H1).await.unwrap();

        // Past the 30 minute TTL but inside 3x TTL.
        clock.advance(Duration::minutes(45));
        let fetch = store.get_candles("btc", Timeframe::H1).await.unwrap();
        assert_eq!(fetch.freshness, Freshness::StaleFallback);
        assert!(fetch.stale_error(clock.now()).is_some());

        // Beyond 3x TTL with no disk copy: nothing left.
        clock.advance(Duration::minutes(60));
        let err = store.get_candles("btc", Timeframe::H1).await.unwrap_err();
        assert!(matches!(err, EngineError::NoDataAvailable { .. }));
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (store, provider, _clock) = fixture();
        store.get_candles("eth", Timeframe::H4).await.unwrap();
        store.invalidate("eth");
        assert!(store.get_candles("eth", Timeframe::H4).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_calls_are_spaced() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            candles: candles(30),
        });
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ));
        let config = FetchConfig {
            min_spacing: std::time::Duration::from_millis(50),
            ..FetchConfig::default()
        };
        let store = CandleStore::memory_only(vec![provider.clone()], clock, config);

        // Distinct keys miss the cache, so every lookup reaches the provider.
        let started = std::time::Instant::now();
        for symbol in ["btc", "eth", "sol"] {
            let _ = store.get_candles(symbol, Timeframe::H1).await;
        }
        assert!(started.elapsed() >= std::time::Duration::from_millis(90));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }
}
