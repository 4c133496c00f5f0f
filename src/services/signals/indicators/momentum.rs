//! Percent price change over a fixed lookback.

use super::Indicator;
use crate::types::Candle;

#[derive(Debug, Clone, Copy)]
pub struct Momentum {
    period: usize,
}

impl Momentum {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// 5-period momentum.
    pub fn short() -> Self {
        Self::new(5)
    }

    /// 20-period momentum.
    pub fn long() -> Self {
        Self::new(20)
    }
}

/// Percent change from `from` to `to`; `None` for a non-positive base.
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    (from > 0.0).then(|| (to - from) / from * 100.0)
}

impl Indicator for Momentum {
    type Output = f64;

    fn id(&self) -> &str {
        "momentum"
    }

    fn min_periods(&self) -> usize {
        self.period + 1
    }

    fn calculate(&self, candles: &[Candle]) -> Option<f64> {
        if self.period == 0 || candles.len() < self.min_periods() {
            return None;
        }
        let last = candles.last()?.close;
        let base = candles[candles.len() - 1 - self.period].close;
        pct_change(base, last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::signals::indicators::test_support::candles_from_closes;

    #[test]
    fn test_short_momentum() {
        let candles = candles_from_closes(&[90.0, 100.0, 101.0, 102.0, 103.0, 104.0, 110.0]);
        let value = Momentum::short().calculate(&candles).unwrap();
        assert!((value - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_long_momentum_needs_21_closes() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert!(Momentum::long().calculate(&candles_from_closes(&closes)).is_none());

        let closes: Vec<f64> = (0..21).map(|i| 100.0 + i as f64).collect();
        let value = Momentum::long().calculate(&candles_from_closes(&closes)).unwrap();
        assert!((value - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_pct_change_guards_zero_base() {
        assert_eq!(pct_change(0.0, 10.0), None);
        assert_eq!(pct_change(50.0, 25.0), Some(-50.0));
    }
}
