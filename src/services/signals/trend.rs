//! Higher-timeframe trend classification.
//!
//! Combines an EMA stack with recent swing structure into a small score:
//! >= 2 is bullish, <= -2 bearish, anything between neutral.

use super::indicators::Ema;
use crate::types::{CandleSeries, HtfTrend};

#[derive(Debug, Clone)]
pub struct HtfTrendDetector {
    min_candles: usize,
    fast: usize,
    slow: usize,
    long: usize,
    /// Bars scanned for swing structure.
    structure_lookback: usize,
}

impl Default for HtfTrendDetector {
    fn default() -> Self {
        Self {
            min_candles: 50,
            fast: 21,
            slow: 50,
            long: 200,
            structure_lookback: 50,
        }
    }
}

impl HtfTrendDetector {
    pub fn detect(&self, series: &CandleSeries) -> HtfTrend {
        let score = self.score(series);
        if score >= 2 {
            HtfTrend::Bullish
        } else if score <= -2 {
            HtfTrend::Bearish
        } else {
            HtfTrend::Neutral
        }
    }

    /// Raw trend score. Zero when the series is too short to judge.
    pub fn score(&self, series: &CandleSeries) -> i32 {
        if series.len() < self.min_candles {
            return 0;
        }
        self.ema_score(series) + self.structure_score(series)
    }

    fn ema_score(&self, series: &CandleSeries) -> i32 {
        let closes = series.closes();
        let (Some(&price), Some(&fast), Some(&slow)) = (
            closes.last(),
            Ema::new(self.fast).series(&closes).last(),
            Ema::new(self.slow).series(&closes).last(),
        ) else {
            return 0;
        };

        // Short series use the longest EMA they can support.
        let long = if closes.len() > self.slow {
            let period = self.long.min(closes.len() - 1);
            Ema::new(period).series(&closes).last().copied()
        } else {
            None
        };

        if price > fast && fast > slow {
            if long.is_some_and(|l| slow > l) {
                3
            } else {
                2
            }
        } else if price < fast && fast < slow {
            if long.is_some_and(|l| slow < l) {
                -3
            } else {
                -2
            }
        } else {
            0
        }
    }

    /// +2 for higher highs and higher lows, -2 for lower highs and lower lows.
    fn structure_score(&self, series: &CandleSeries) -> i32 {
        let candles = series.candles();
        let n = candles.len();
        let lookback = self.structure_lookback.min(n.saturating_sub(2));

        let mut highs = Vec::new();
        let mut lows = Vec::new();
        // Newest first.
        for i in 2..lookback {
            let idx = n - i - 1;
            if idx == 0 || idx >= n - 1 {
                continue;
            }
            let (prev, curr, next) = (&candles[idx - 1], &candles[idx], &candles[idx + 1]);
            if curr.high > prev.high && curr.high > next.high {
                highs.push(curr.high);
            }
            if curr.low < prev.low && curr.low < next.low {
                lows.push(curr.low);
            }
        }

        let ([latest_high, prior_high, ..], [latest_low, prior_low, ..]) =
            (highs.as_slice(), lows.as_slice())
        else {
            return 0;
        };

        if latest_high > prior_high && latest_low > prior_low {
            2
        } else if latest_high < prior_high && latest_low < prior_low {
            -2
        } else {
            0
        }
    }
}
