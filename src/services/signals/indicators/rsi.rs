//! Relative Strength Index (RSI) indicator.

use super::Indicator;
use crate::error::{EngineError, Result};
use crate::types::Candle;

/// Value reported when there is not enough history.
pub const NEUTRAL_RSI: f64 = 50.0;

/// RSI (Relative Strength Index) indicator.
///
/// Measures momentum by comparing the magnitude of recent gains to recent losses.
/// Values range from 0-100. The first average is a simple mean over `period`
/// changes, later values use Wilder smoothing.
#[derive(Debug, Clone, Copy)]
pub struct Rsi {
    period: usize,
}

impl Default for Rsi {
    fn default() -> Self {
        Self { period: 14 }
    }
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    fn value(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            if avg_gain == 0.0 {
                return NEUTRAL_RSI;
            }
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        100.0 - (100.0 / (1.0 + rs))
    }

    /// RSI at every close. Entries before the warm-up are `None`.
    pub fn series(&self, closes: &[f64]) -> Vec<Option<f64>> {
        let period = self.period;
        let mut out = vec![None; closes.len()];
        if period == 0 || closes.len() < period + 1 {
            return out;
        }

        let (gains, losses): (Vec<f64>, Vec<f64>) = closes
            .windows(2)
            .map(|w| {
                let change = w[1] - w[0];
                (change.max(0.0), (-change).max(0.0))
            })
            .unzip();

        let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
        let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
        out[period] = Some(Self::value(avg_gain, avg_loss));

        for i in period..gains.len() {
            avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
            out[i + 1] = Some(Self::value(avg_gain, avg_loss));
        }

        out
    }

    /// Latest RSI, or `InsufficientHistory` when fewer than `period + 1` closes exist.
    pub fn try_calculate(&self, candles: &[Candle]) -> Result<f64> {
        self.calculate(candles)
            .ok_or(EngineError::InsufficientHistory {
                required: self.min_periods(),
                available: candles.len(),
            })
    }

    /// Latest RSI with the neutral 50 substituted on short history.
    pub fn calculate_or_neutral(&self, candles: &[Candle]) -> f64 {
        self.calculate(candles).unwrap_or(NEUTRAL_RSI)
    }
}

impl Indicator for Rsi {
    type Output = f64;

    fn id(&self) -> &str {
        "rsi"
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Option<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.series(&closes).last().copied().flatten()
    }
}
