//! MACD (Moving Average Convergence Divergence) indicator.

use super::{Ema, Indicator};
use crate::types::{Candle, MacdValue};

/// MACD indicator.
///
/// - MACD Line = EMA(12) - EMA(26)
/// - Signal Line = EMA(9) of MACD Line
/// - Histogram = MACD Line - Signal Line
#[derive(Debug, Clone, Copy)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Default for Macd {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
        }
    }
}

impl Macd {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast_period,
            slow_period,
            signal_period,
        }
    }
}

impl Indicator for Macd {
    type Output = MacdValue;

    fn id(&self) -> &str {
        "macd"
    }

    /// The signal line needs `signal_period` MACD points, the first of which
    /// needs `slow_period` closes.
    fn min_periods(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    fn calculate(&self, candles: &[Candle]) -> Option<MacdValue> {
        if candles.len() < self.min_periods() || self.fast_period > self.slow_period {
            return None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast_ema = Ema::new(self.fast_period).series(&closes);
        let slow_ema = Ema::new(self.slow_period).series(&closes);

        // Align the EMAs (fast starts earlier)
        let offset = self.slow_period - self.fast_period;
        let macd_line: Vec<f64> = fast_ema
            .iter()
            .skip(offset)
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();

        let signal_line = Ema::new(self.signal_period).series(&macd_line);
        let line = *macd_line.last()?;
        let signal = *signal_line.last()?;

        Some(MacdValue {
            line,
            signal,
            histogram: line - signal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::signals::indicators::test_support::candles_from_closes;

    #[test]
    fn test_macd_min_periods() {
        assert_eq!(Macd::default().min_periods(), 34);
    }

    #[test]
    fn test_macd_insufficient_data() {
        let closes: Vec<f64> = (0..33).map(|i| 100.0 + i as f64).collect();
        assert!(Macd::default().calculate(&candles_from_closes(&closes)).is_none());

        let closes: Vec<f64> = (0..34).map(|i| 100.0 + i as f64).collect();
        assert!(Macd::default().calculate(&candles_from_closes(&closes)).is_some());
    }

    #[test]
    fn test_macd_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let macd = Macd::default().calculate(&candles_from_closes(&closes)).unwrap();
        assert!(macd.line > 0.0);
        assert!((macd.histogram - (macd.line - macd.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_negative_in_downtrend() {
        let closes: Vec<f64> = (0..60).map(|i| 200.0 * 0.99f64.powi(i)).collect();
        let macd = Macd::default().calculate(&candles_from_closes(&closes)).unwrap();
        assert!(macd.line < 0.0);
    }

    #[test]
    fn test_macd_flat_is_zero() {
        let macd = Macd::default()
            .calculate(&candles_from_closes(&[50.0; 40]))
            .unwrap();
        assert_eq!(macd.line, 0.0);
        assert_eq!(macd.signal, 0.0);
        assert_eq!(macd.histogram, 0.0);
    }
}
