//! Support and resistance from recent extremes.

use super::Indicator;
use crate::types::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub support: f64,
    pub resistance: f64,
}

impl Levels {
    /// Percent distance from `price` down to support.
    pub fn distance_to_support_pct(&self, price: f64) -> f64 {
        (price - self.support).abs() / price * 100.0
    }

    /// Percent distance from `price` up to resistance.
    pub fn distance_to_resistance_pct(&self, price: f64) -> f64 {
        (self.resistance - price).abs() / price * 100.0
    }
}

/// Lowest low and highest high over the trailing `lookback` candles.
#[derive(Debug, Clone, Copy)]
pub struct SupportResistance {
    lookback: usize,
}

impl Default for SupportResistance {
    fn default() -> Self {
        Self { lookback: 20 }
    }
}

impl SupportResistance {
    pub fn new(lookback: usize) -> Self {
        Self { lookback }
    }
}

impl Indicator for SupportResistance {
    type Output = Levels;

    fn id(&self) -> &str {
        "support_resistance"
    }

    fn min_periods(&self) -> usize {
        self.lookback
    }

    fn calculate(&self, candles: &[Candle]) -> Option<Levels> {
        if self.lookback == 0 || candles.len() < self.lookback {
            return None;
        }
        let window = &candles[candles.len() - self.lookback..];
        let support = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let resistance = window
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        Some(Levels {
            support,
            resistance,
        })
    }
}
