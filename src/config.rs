use crate::types::Timeframe;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Candle acquisition configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Candles requested per provider call.
    pub candle_limit: usize,
    /// Shortest series accepted from a provider.
    pub min_candles: usize,
    /// Per-call provider timeout.
    pub provider_timeout: Duration,
    /// Minimum spacing between calls to the same provider.
    pub min_spacing: Duration,
    /// Directory for the on-disk disaster cache.
    pub cache_dir: PathBuf,
    /// Maximum age of a disk copy that may still be served.
    pub disaster_window: Duration,
    /// An expired memory entry is reused up to this many TTLs old.
    pub stale_ttl_multiplier: u32,
    /// CryptoCompare API key (optional, raises rate limits).
    pub cryptocompare_api_key: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            candle_limit: 100,
            min_candles: 20,
            provider_timeout: Duration::from_secs(10),
            min_spacing: Duration::from_millis(200),
            cache_dir: PathBuf::from(".candle_cache"),
            disaster_window: Duration::from_secs(24 * 3600),
            stale_ttl_multiplier: 3,
            cryptocompare_api_key: None,
        }
    }
}

/// Per-timeframe bias thresholds.
#[derive(Debug, Clone)]
pub struct ConfluenceConfig {
    /// RSI below this (with non-negative momentum) reads BUY.
    pub bias_rsi_buy_below: f64,
    /// RSI above this (with non-positive momentum) reads SELL.
    pub bias_rsi_sell_above: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            bias_rsi_buy_below: 45.0,
            bias_rsi_sell_above: 55.0,
        }
    }
}

/// Gate thresholds and level sizing for the signal policy.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub min_composite_score: f64,
    pub min_volume_ratio: f64,
    /// Required agreeing factors out of RSI zone, MACD, momentum and HTF trend.
    pub min_agreement: usize,
    /// BUY is vetoed at or above this RSI.
    pub veto_rsi_buy_at: f64,
    /// SELL is vetoed at or below this RSI.
    pub veto_rsi_sell_at: f64,
    pub sr_proximity_pct: f64,
    pub sr_bonus: f64,
    pub min_streak: u32,
    pub max_volatility_pct: f64,
    /// Classic divergence must be stronger than this to stand as a candidate.
    pub min_divergence_strength: f64,
    pub divergence_modifier: f64,
    pub dominant_modifier: f64,
    pub max_confidence: f64,
    pub entry_band_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub divergence_take_profit_pct: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_composite_score: 60.0,
            min_volume_ratio: 1.0,
            min_agreement: 2,
            veto_rsi_buy_at: 60.0,
            veto_rsi_sell_at: 40.0,
            sr_proximity_pct: 2.0,
            sr_bonus: 10.0,
            min_streak: 2,
            max_volatility_pct: 12.0,
            min_divergence_strength: 40.0,
            divergence_modifier: 0.85,
            dominant_modifier: 0.70,
            max_confidence: 98.0,
            entry_band_pct: 0.5,
            stop_loss_pct: 3.0,
            take_profit_pct: 8.0,
            divergence_take_profit_pct: 10.0,
        }
    }
}

/// Signal lifetime rules.
#[derive(Debug, Clone)]
pub struct StateConfig {
    /// Minimum seconds between bias changes for one symbol.
    pub debounce_secs: i64,
    /// Seconds a signal lives without re-validation.
    pub signal_ttl_secs: i64,
    /// SQLite file for active signals; `None` keeps state in memory.
    pub db_path: Option<String>,
}

impl StateConfig {
    pub fn debounce(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.debounce_secs)
    }

    pub fn signal_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.signal_ttl_secs)
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            debounce_secs: 2 * 3600,
            signal_ttl_secs: 4 * 3600,
            db_path: None,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Symbols evaluated each cycle.
    pub tracked_symbols: Vec<String>,
    /// Seconds between evaluation cycles.
    pub eval_interval: Duration,
    /// Timeframe used for price, volume and confirmation gates.
    pub primary_timeframe: Timeframe,
    /// Timeframe for HTF trend and divergence.
    pub htf_timeframe: Timeframe,
    pub fetch: FetchConfig,
    pub confluence: ConfluenceConfig,
    pub policy: PolicyConfig,
    pub state: StateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracked_symbols: ["BTC", "ETH", "SOL", "ADA", "AVAX", "LINK"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            eval_interval: Duration::from_secs(300),
            primary_timeframe: Timeframe::H1,
            htf_timeframe: Timeframe::H4,
            fetch: FetchConfig::default(),
            confluence: ConfluenceConfig::default(),
            policy: PolicyConfig::default(),
            state: StateConfig::default(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a comma separated symbol list, uppercased, empties dropped.
pub fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let tracked_symbols = env::var("TRACKED_SYMBOLS")
            .ok()
            .map(|s| parse_symbols(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.tracked_symbols);

        let fetch = FetchConfig {
            candle_limit: parse_env("CANDLE_LIMIT").unwrap_or(defaults.fetch.candle_limit),
            min_candles: parse_env("MIN_CANDLES").unwrap_or(defaults.fetch.min_candles),
            provider_timeout: parse_env("PROVIDER_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch.provider_timeout),
            min_spacing: parse_env("PROVIDER_MIN_SPACING_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.fetch.min_spacing),
            cache_dir: env::var("CANDLE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.fetch.cache_dir),
            disaster_window: parse_env("DISASTER_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.fetch.disaster_window),
            stale_ttl_multiplier: defaults.fetch.stale_ttl_multiplier,
            cryptocompare_api_key: env::var("CRYPTOCOMPARE_API_KEY").ok(),
        };

        let confluence = ConfluenceConfig {
            bias_rsi_buy_below: parse_env("BIAS_RSI_BUY_BELOW")
                .unwrap_or(defaults.confluence.bias_rsi_buy_below),
            bias_rsi_sell_above: parse_env("BIAS_RSI_SELL_ABOVE")
                .unwrap_or(defaults.confluence.bias_rsi_sell_above),
        };

        let policy = PolicyConfig {
            min_composite_score: parse_env("MIN_COMPOSITE_SCORE")
                .unwrap_or(defaults.policy.min_composite_score),
            veto_rsi_buy_at: parse_env("VETO_RSI_BUY_AT")
                .unwrap_or(defaults.policy.veto_rsi_buy_at),
            veto_rsi_sell_at: parse_env("VETO_RSI_SELL_AT")
                .unwrap_or(defaults.policy.veto_rsi_sell_at),
            max_volatility_pct: parse_env("MAX_VOLATILITY_PCT")
                .unwrap_or(defaults.policy.max_volatility_pct),
            min_divergence_strength: parse_env("MIN_DIVERGENCE_STRENGTH")
                .unwrap_or(defaults.policy.min_divergence_strength),
            ..defaults.policy
        };

        let state = StateConfig {
            debounce_secs: parse_env("DEBOUNCE_SECS").unwrap_or(defaults.state.debounce_secs),
            signal_ttl_secs: parse_env("SIGNAL_TTL_SECS")
                .unwrap_or(defaults.state.signal_ttl_secs),
            // Unset uses the default file; set but empty keeps state in memory.
            db_path: match env::var("SIGNAL_DB_PATH") {
                Ok(path) if path.trim().is_empty() => None,
                Ok(path) => Some(path),
                Err(_) => Some("data/signals.db".to_string()),
            },
        };

        Self {
            tracked_symbols,
            eval_interval: parse_env("EVAL_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.eval_interval),
            primary_timeframe: env::var("PRIMARY_TIMEFRAME")
                .ok()
                .and_then(|v| Timeframe::from_str(&v))
                .unwrap_or(defaults.primary_timeframe),
            htf_timeframe: env::var("HTF_TIMEFRAME")
                .ok()
                .and_then(|v| Timeframe::from_str(&v))
                .unwrap_or(defaults.htf_timeframe),
            fetch,
            confluence,
            policy,
            state,
        }
    }
}
