use super::{Bias, HtfTrend};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which policy path produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalSource {
    Confluence,
    Divergence,
    DominantTf,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Confluence => "CONFLUENCE",
            SignalSource::Divergence => "DIVERGENCE",
            SignalSource::DominantTf => "DOMINANT_TF",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CONFLUENCE" => Some(SignalSource::Confluence),
            "DIVERGENCE" => Some(SignalSource::Divergence),
            "DOMINANT_TF" => Some(SignalSource::DominantTf),
            _ => None,
        }
    }
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry band and protective levels for a directional call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub entry_price: f64,
    pub entry_low: f64,
    pub entry_high: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// The engine's current directional call for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub bias: Bias,
    /// 0-98.
    pub confidence: f64,
    pub entry_price: f64,
    pub entry_low: f64,
    pub entry_high: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub htf_trend: HtfTrend,
    pub source: SignalSource,
    /// Built from stale fallback candles.
    pub provisional: bool,
    pub created_at: DateTime<Utc>,
    pub last_changed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Signal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether `price` has reached the stop-loss or take-profit for this bias.
    pub fn level_crossed(&self, price: f64) -> Option<LevelHit> {
        match self.bias {
            Bias::Buy if price <= self.stop_loss => Some(LevelHit::StopLoss),
            Bias::Buy if price >= self.take_profit => Some(LevelHit::TakeProfit),
            Bias::Sell if price >= self.stop_loss => Some(LevelHit::StopLoss),
            Bias::Sell if price <= self.take_profit => Some(LevelHit::TakeProfit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelHit {
    StopLoss,
    TakeProfit,
}
