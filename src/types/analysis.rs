use super::Timeframe;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Directional bias of a timeframe, candidate, or signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    Buy,
    Sell,
    Hold,
}

impl Bias {
    /// +1 for BUY, -1 for SELL, 0 for HOLD.
    pub fn direction(&self) -> f64 {
        match self {
            Bias::Buy => 1.0,
            Bias::Sell => -1.0,
            Bias::Hold => 0.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Buy => "BUY",
            Bias::Sell => "SELL",
            Bias::Hold => "HOLD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(Bias::Buy),
            "SELL" => Some(Bias::Sell),
            "HOLD" => Some(Bias::Hold),
            _ => None,
        }
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MACD line, its signal line and the histogram between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdValue {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Indicator values for one (symbol, timeframe). `None` marks insufficient history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub timeframe: Timeframe,
    /// Number of candles the snapshot was computed from.
    pub periods: usize,
    /// Wilder RSI; `None` when fewer than period + 1 closes exist.
    pub rsi: Option<f64>,
    pub macd: Option<MacdValue>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    /// Percent change over the trailing 5 periods.
    pub momentum_short: Option<f64>,
    /// Percent change over the trailing 20 periods.
    pub momentum_long: Option<f64>,
    /// Latest volume over the trailing average.
    pub volume_ratio: Option<f64>,
    pub last_close: f64,
    /// Percent change over the trailing 24 periods (falls back to the full series).
    pub recent_change_pct: Option<f64>,
    /// Signed run length of same-direction closes ending at the latest candle.
    pub streak: i32,
}

impl IndicatorSnapshot {
    /// RSI value with the neutral 50 substituted when history is short.
    pub fn rsi_or_neutral(&self) -> f64 {
        self.rsi.unwrap_or(50.0)
    }

    /// Whether every indicator had enough history.
    pub fn is_complete(&self) -> bool {
        self.rsi.is_some()
            && self.macd.is_some()
            && self.support.is_some()
            && self.resistance.is_some()
            && self.momentum_short.is_some()
            && self.momentum_long.is_some()
            && self.volume_ratio.is_some()
    }
}

/// Bias of a single timeframe inside a confluence read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeBias {
    pub timeframe: Timeframe,
    pub bias: Bias,
    /// Zero when the timeframe had no usable RSI.
    pub weight: f64,
    pub rsi: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfluenceStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl ConfluenceStrength {
    /// Classify from the number of timeframes agreeing with the aggregate.
    pub fn from_agreeing(count: usize) -> Self {
        match count {
            c if c >= 4 => ConfluenceStrength::VeryStrong,
            3 => ConfluenceStrength::Strong,
            2 => ConfluenceStrength::Moderate,
            _ => ConfluenceStrength::Weak,
        }
    }

    /// Confidence multiplier applied to confluence candidates.
    pub fn confidence_modifier(&self) -> f64 {
        match self {
            ConfluenceStrength::Weak => 0.70,
            ConfluenceStrength::Moderate => 0.80,
            ConfluenceStrength::Strong => 0.90,
            ConfluenceStrength::VeryStrong => 1.00,
        }
    }
}

/// Weighted cross-timeframe agreement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceResult {
    pub symbol: String,
    pub overall_bias: Bias,
    pub strength: ConfluenceStrength,
    /// Weighted agreement, 0-100.
    pub score: f64,
    /// Timeframes whose bias matches `overall_bias`.
    pub agreeing: usize,
    pub timeframes: Vec<TimeframeBias>,
}

impl ConfluenceResult {
    /// Longest timeframe with a clear non-HOLD bias.
    pub fn dominant(&self) -> Option<&TimeframeBias> {
        self.timeframes
            .iter()
            .filter(|tb| tb.bias != Bias::Hold)
            .max_by_key(|tb| tb.timeframe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DivergenceKind {
    None,
    Bullish,
    Bearish,
    HiddenBullish,
    HiddenBearish,
}

impl DivergenceKind {
    /// Direction the divergence points to.
    pub fn bias(&self) -> Bias {
        match self {
            DivergenceKind::Bullish | DivergenceKind::HiddenBullish => Bias::Buy,
            DivergenceKind::Bearish | DivergenceKind::HiddenBearish => Bias::Sell,
            DivergenceKind::None => Bias::Hold,
        }
    }

    pub fn is_classic(&self) -> bool {
        matches!(self, DivergenceKind::Bullish | DivergenceKind::Bearish)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceResult {
    pub kind: DivergenceKind,
    /// 0-100, proportional to the price/RSI divergence.
    pub strength: f64,
    pub timeframe: Timeframe,
    pub description: String,
}

impl DivergenceResult {
    pub fn none(timeframe: Timeframe, description: &str) -> Self {
        Self {
            kind: DivergenceKind::None,
            strength: 0.0,
            timeframe,
            description: description.to_string(),
        }
    }

    pub fn is_detected(&self) -> bool {
        self.kind != DivergenceKind::None
    }
}

/// Higher-timeframe trend used as a directional filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HtfTrend {
    Bullish,
    Bearish,
    Neutral,
}

impl HtfTrend {
    /// Whether a signal with `bias` may coexist with this trend.
    pub fn permits(&self, bias: Bias) -> bool {
        !matches!(
            (self, bias),
            (HtfTrend::Bearish, Bias::Buy) | (HtfTrend::Bullish, Bias::Sell)
        )
    }

    /// Whether the trend points the same way as `bias`.
    pub fn agrees_with(&self, bias: Bias) -> bool {
        matches!(
            (self, bias),
            (HtfTrend::Bullish, Bias::Buy) | (HtfTrend::Bearish, Bias::Sell)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HtfTrend::Bullish => "BULLISH",
            HtfTrend::Bearish => "BEARISH",
            HtfTrend::Neutral => "NEUTRAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "BULLISH" => Some(HtfTrend::Bullish),
            "BEARISH" => Some(HtfTrend::Bearish),
            "NEUTRAL" => Some(HtfTrend::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for HtfTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
