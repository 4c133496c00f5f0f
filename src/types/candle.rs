use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Candle timeframe tracked by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    /// All timeframes, shortest first.
    pub const ALL: [Timeframe; 5] = [
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "15m" => Some(Self::M15),
            "1h" => Some(Self::H1),
            "4h" => Some(Self::H4),
            "1d" => Some(Self::D1),
            "1w" => Some(Self::W1),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
            Self::W1 => "1w",
        }
    }

    /// Bucket length in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::M15 => 900,
            Self::H1 => 3_600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
            Self::W1 => 604_800,
        }
    }

    /// How long a fetched series is served from memory.
    ///
    /// Finer timeframes go stale faster relative to their bucket size.
    pub fn cache_ttl(&self) -> Duration {
        let secs = match self {
            Self::M15 => 600,
            Self::H1 => 1_800,
            Self::H4 => 3_600,
            Self::D1 => 7_200,
            Self::W1 => 14_400,
        };
        Duration::from_secs(secs)
    }

    /// Confluence weight; longer timeframes carry less noise.
    pub fn weight(&self) -> f64 {
        match self {
            Self::M15 => 1.0,
            Self::H1 => 2.0,
            Self::H4 => 3.0,
            Self::D1 => 4.0,
            Self::W1 => 5.0,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OHLCV candle. `timestamp` is the bucket open time in unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    fn validate(&self) -> std::result::Result<(), String> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(format!("non-positive price at {}", self.timestamp));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(format!("invalid volume at {}", self.timestamp));
        }
        if self.high < self.open.max(self.close) || self.low > self.open.min(self.close) {
            return Err(format!("inconsistent high/low at {}", self.timestamp));
        }
        Ok(())
    }
}

/// Validated, oldest-first candles for one (symbol, timeframe).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    /// Build a series, rejecting anything shorter than `min_len` or with bad values.
    pub fn new(
        symbol: &str,
        timeframe: Timeframe,
        candles: Vec<Candle>,
        min_len: usize,
    ) -> Result<Self> {
        if candles.len() < min_len {
            return Err(EngineError::MalformedData(format!(
                "{} {}: {} candles, need {}",
                symbol,
                timeframe,
                candles.len(),
                min_len
            )));
        }

        for candle in &candles {
            candle.validate().map_err(|e| {
                EngineError::MalformedData(format!("{} {}: {}", symbol, timeframe, e))
            })?;
        }

        if candles.windows(2).any(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(EngineError::MalformedData(format!(
                "{} {}: timestamps not strictly increasing",
                symbol, timeframe
            )));
        }

        Ok(Self {
            symbol: symbol.to_uppercase(),
            timeframe,
            candles,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }
}
