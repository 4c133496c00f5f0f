//! Exponential Moving Average (EMA) indicator.

use super::Indicator;
use crate::types::Candle;

/// EMA (Exponential Moving Average) indicator.
///
/// Seeded with the simple mean of the first `period` values.
#[derive(Debug, Clone, Copy)]
pub struct Ema {
    period: usize,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// EMA over `values`. The first element corresponds to `values[period - 1]`.
    pub fn series(&self, values: &[f64]) -> Vec<f64> {
        let period = self.period;
        if period == 0 || values.len() < period {
            return Vec::new();
        }

        let multiplier = 2.0 / (period as f64 + 1.0);
        let mut ema = Vec::with_capacity(values.len() - period + 1);

        // First EMA is SMA
        let mut current = values[..period].iter().sum::<f64>() / period as f64;
        ema.push(current);

        for value in &values[period..] {
            current = (value - current) * multiplier + current;
            ema.push(current);
        }

        ema
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn id(&self) -> &str {
        "ema"
    }

    fn min_periods(&self) -> usize {
        self.period
    }

    fn calculate(&self, candles: &[Candle]) -> Option<f64> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.series(&closes).last().copied()
    }
}
