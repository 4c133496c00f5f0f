//! Technical indicator implementations.
//!
//! Every indicator is a pure function of the candles it is given and
//! returns `None` when the history is too short.

pub mod ema;
pub mod levels;
pub mod macd;
pub mod momentum;
pub mod rsi;
pub mod volume;

pub use ema::Ema;
pub use levels::{Levels, SupportResistance};
pub use macd::Macd;
pub use momentum::{pct_change, Momentum};
pub use rsi::{Rsi, NEUTRAL_RSI};
pub use volume::VolumeRatio;

use crate::types::{Candle, CandleSeries, IndicatorSnapshot};

/// Periods used for the volatility check.
pub const RECENT_CHANGE_PERIODS: usize = 24;

/// Trait for implementing technical indicators.
pub trait Indicator {
    type Output;

    /// Unique identifier for this indicator.
    fn id(&self) -> &str;

    /// Minimum number of candles required for calculation.
    fn min_periods(&self) -> usize;

    /// Calculate from oldest-first candles. `None` if history is insufficient.
    fn calculate(&self, candles: &[Candle]) -> Option<Self::Output>;
}

/// Compute every indicator for a series with default periods.
pub fn compute_snapshot(series: &CandleSeries) -> IndicatorSnapshot {
    let candles = series.candles();
    let levels = SupportResistance::default().calculate(candles);

    IndicatorSnapshot {
        timeframe: series.timeframe(),
        periods: candles.len(),
        rsi: Rsi::default().calculate(candles),
        macd: Macd::default().calculate(candles),
        support: levels.map(|l| l.support),
        resistance: levels.map(|l| l.resistance),
        momentum_short: Momentum::short().calculate(candles),
        momentum_long: Momentum::long().calculate(candles),
        volume_ratio: VolumeRatio::default().calculate(candles),
        last_close: candles.last().map(|c| c.close).unwrap_or_default(),
        recent_change_pct: recent_change_pct(candles, RECENT_CHANGE_PERIODS),
        streak: close_streak(candles),
    }
}

/// Percent change over the trailing `periods`, or over the whole series when shorter.
pub fn recent_change_pct(candles: &[Candle], periods: usize) -> Option<f64> {
    let last = candles.last()?.close;
    let start = candles.len().saturating_sub(periods + 1);
    if start == candles.len() - 1 {
        return None;
    }
    pct_change(candles[start].close, last)
}

/// Signed length of the run of same-direction closes ending at the last candle.
///
/// +3 means three consecutive higher closes; an unchanged close ends the run.
pub fn close_streak(candles: &[Candle]) -> i32 {
    let mut streak = 0i32;
    for pair in candles.windows(2).rev() {
        let step = if pair[1].close > pair[0].close {
            1
        } else if pair[1].close < pair[0].close {
            -1
        } else {
            0
        };
        if step == 0 || (streak != 0 && step != streak.signum()) {
            break;
        }
        streak += step;
    }
    streak
}
