//! RSI divergence detection.
//!
//! Compares the two most recent swing lows (then swing highs) in price with
//! the RSI at the same bars. Lows are checked first; highs only when the
//! lows show nothing.

use super::indicators::Rsi;
use crate::types::{CandleSeries, DivergenceKind, DivergenceResult};

/// A local extremum and the RSI on that bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Swing {
    index: usize,
    price: f64,
    rsi: f64,
}

#[derive(Debug, Clone)]
pub struct DivergenceDetector {
    rsi: Rsi,
    /// Bars on each side a swing must beat.
    swing_window: usize,
    min_candles: usize,
    /// Classic patterns need at least this price move (percent).
    min_price_move_pct: f64,
    /// Classic patterns need at least this RSI move (points).
    min_rsi_move: f64,
}

impl Default for DivergenceDetector {
    fn default() -> Self {
        Self {
            rsi: Rsi::default(),
            swing_window: 3,
            min_candles: 30,
            min_price_move_pct: 1.5,
            min_rsi_move: 3.0,
        }
    }
}

impl DivergenceDetector {
    pub fn detect(&self, series: &CandleSeries) -> DivergenceResult {
        let rsi = self.rsi.series(&series.closes());
        self.detect_with_rsi(series, &rsi)
    }

    /// Detect using a precomputed RSI series aligned with the candles.
    pub fn detect_with_rsi(&self, series: &CandleSeries, rsi: &[Option<f64>]) -> DivergenceResult {
        let timeframe = series.timeframe();
        if series.len() < self.min_candles || rsi.len() != series.len() {
            return DivergenceResult::none(timeframe, "Insufficient data");
        }

        let candles = series.candles();
        let lows: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let highs: Vec<f64> = candles.iter().map(|c| c.high).collect();

        let swing_lows = self.find_swings(&lows, rsi, |a, b| a < b);
        if let Some(result) = self.compare_lows(&swing_lows, series) {
            return result;
        }

        let swing_highs = self.find_swings(&highs, rsi, |a, b| a > b);
        if let Some(result) = self.compare_highs(&swing_highs, series) {
            return result;
        }

        DivergenceResult::none(timeframe, "No divergence detected")
    }

    /// Bars that strictly beat every neighbour within the window, after RSI warm-up.
    fn find_swings(
        &self,
        values: &[f64],
        rsi: &[Option<f64>],
        beats: impl Fn(f64, f64) -> bool,
    ) -> Vec<Swing> {
        let w = self.swing_window;
        let start = w + self.rsi.period();
        if values.len() < start + w + 1 {
            return Vec::new();
        }

        (start..values.len() - w)
            .filter(|&i| {
                (i - w..=i + w)
                    .filter(|&j| j != i)
                    .all(|j| beats(values[i], values[j]))
            })
            .filter_map(|i| {
                rsi[i].map(|r| Swing {
                    index: i,
                    price: values[i],
                    rsi: r,
                })
            })
            .collect()
    }

    fn strength(price_move_pct: f64, rsi_delta: f64) -> f64 {
        (price_move_pct * 8.0 + rsi_delta * 4.0).min(100.0)
    }

    fn compare_lows(&self, swings: &[Swing], series: &CandleSeries) -> Option<DivergenceResult> {
        let [.., prev, curr] = swings else {
            return None;
        };

        if curr.price < prev.price && curr.rsi > prev.rsi {
            let price_drop = (prev.price - curr.price) / prev.price * 100.0;
            let rsi_rise = curr.rsi - prev.rsi;
            if price_drop > self.min_price_move_pct && rsi_rise > self.min_rsi_move {
                return Some(DivergenceResult {
                    kind: DivergenceKind::Bullish,
                    strength: Self::strength(price_drop, rsi_rise),
                    timeframe: series.timeframe(),
                    description: format!(
                        "Price made lower low (-{:.1}%) but RSI rose (+{:.1}) over {} bars",
                        price_drop,
                        rsi_rise,
                        curr.index - prev.index
                    ),
                });
            }
        } else if curr.price > prev.price && curr.rsi < prev.rsi {
            let price_rise = (curr.price - prev.price) / prev.price * 100.0;
            let rsi_drop = prev.rsi - curr.rsi;
            return Some(DivergenceResult {
                kind: DivergenceKind::HiddenBullish,
                strength: Self::strength(price_rise, rsi_drop),
                timeframe: series.timeframe(),
                description: "Higher low in price with lower RSI low".to_string(),
            });
        }
        None
    }

    fn compare_highs(&self, swings: &[Swing], series: &CandleSeries) -> Option<DivergenceResult> {
        let [.., prev, curr] = swings else {
            return None;
        };

        if curr.price > prev.price && curr.rsi < prev.rsi {
            let price_rise = (curr.price - prev.price) / prev.price * 100.0;
            let rsi_drop = prev.rsi - curr.rsi;
            if price_rise > self.min_price_move_pct && rsi_drop > self.min_rsi_move {
                return Some(DivergenceResult {
                    kind: DivergenceKind::Bearish,
                    strength: Self::strength(price_rise, rsi_drop),
                    timeframe: series.timeframe(),
                    description: format!(
                        "Price made higher high (+{:.1}%) but RSI fell (-{:.1}) over {} bars",
                        price_rise,
                        rsi_drop,
                        curr.index - prev.index
                    ),
                });
            }
        } else if curr.price < prev.price && curr.rsi > prev.rsi {
            let price_drop = (prev.price - curr.price) / prev.price * 100.0;
            let rsi_rise = curr.rsi - prev.rsi;
            return Some(DivergenceResult {
                kind: DivergenceKind::HiddenBearish,
                strength: Self::strength(price_drop, rsi_rise),
                timeframe: series.timeframe(),
                description: "Lower high in price with higher RSI high".to_string(),
            });
        }
        None
    }
}
