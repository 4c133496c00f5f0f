//! Latest volume relative to its trailing average.

use super::Indicator;
use crate::types::Candle;

#[derive(Debug, Clone, Copy)]
pub struct VolumeRatio {
    lookback: usize,
}

impl Default for VolumeRatio {
    fn default() -> Self {
        Self { lookback: 20 }
    }
}

impl VolumeRatio {
    pub fn new(lookback: usize) -> Self {
        Self { lookback }
    }
}

impl Indicator for VolumeRatio {
    type Output = f64;

    fn id(&self) -> &str {
        "volume_ratio"
    }

    fn min_periods(&self) -> usize {
        self.lookback + 1
    }

    /// Latest volume over the mean of the `lookback` volumes before it.
    fn calculate(&self, candles: &[Candle]) -> Option<f64> {
        if self.lookback == 0 || candles.len() < self.min_periods() {
            return None;
        }
        let (latest, previous) = candles.split_last()?;
        let window = &previous[previous.len() - self.lookback..];
        let average = window.iter().map(|c| c.volume).sum::<f64>() / self.lookback as f64;
        (average > 0.0).then(|| latest.volume / average)
    }
}
