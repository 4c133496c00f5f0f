//! Multi-timeframe confluence scoring.

use crate::config::ConfluenceConfig;
use crate::types::{
    Bias, ConfluenceResult, ConfluenceStrength, IndicatorSnapshot, Timeframe, TimeframeBias,
};

/// Reads a bias per timeframe and aggregates them by timeframe weight.
#[derive(Debug, Clone, Default)]
pub struct ConfluenceEngine {
    config: ConfluenceConfig,
}

impl ConfluenceEngine {
    pub fn new(config: ConfluenceConfig) -> Self {
        Self { config }
    }

    /// BUY on low RSI with non-negative short momentum, SELL on high RSI with
    /// non-positive short momentum. Missing momentum counts as flat.
    pub fn bias_for(&self, snapshot: &IndicatorSnapshot) -> Bias {
        let Some(rsi) = snapshot.rsi else {
            return Bias::Hold;
        };
        let momentum = snapshot.momentum_short.unwrap_or(0.0);

        if rsi < self.config.bias_rsi_buy_below && momentum >= 0.0 {
            Bias::Buy
        } else if rsi > self.config.bias_rsi_sell_above && momentum <= 0.0 {
            Bias::Sell
        } else {
            Bias::Hold
        }
    }

    fn timeframe_bias(
        &self,
        timeframe: Timeframe,
        snapshot: Option<&IndicatorSnapshot>,
    ) -> TimeframeBias {
        match snapshot {
            Some(s) if s.rsi.is_some() => TimeframeBias {
                timeframe,
                bias: self.bias_for(s),
                weight: timeframe.weight(),
                rsi: s.rsi,
            },
            // No usable history: HOLD without weight.
            _ => TimeframeBias {
                timeframe,
                bias: Bias::Hold,
                weight: 0.0,
                rsi: None,
            },
        }
    }

    /// Combine per-timeframe snapshots. `None` marks a timeframe that could not be fetched.
    pub fn combine(
        &self,
        symbol: &str,
        snapshots: &[(Timeframe, Option<IndicatorSnapshot>)],
    ) -> ConfluenceResult {
        let timeframes: Vec<TimeframeBias> = snapshots
            .iter()
            .map(|(tf, snapshot)| self.timeframe_bias(*tf, snapshot.as_ref()))
            .collect();

        let weighted_sum: f64 = timeframes
            .iter()
            .map(|tb| tb.weight * tb.bias.direction())
            .sum();
        let total_weight: f64 = timeframes.iter().map(|tb| tb.weight).sum();

        let overall_bias = if weighted_sum > 0.0 {
            Bias::Buy
        } else if weighted_sum < 0.0 {
            Bias::Sell
        } else {
            Bias::Hold
        };

        let score = if total_weight > 0.0 {
            (weighted_sum.abs() / total_weight * 100.0).min(100.0)
        } else {
            0.0
        };

        let agreeing = if overall_bias == Bias::Hold {
            0
        } else {
            timeframes.iter().filter(|tb| tb.bias == overall_bias).count()
        };

        ConfluenceResult {
            symbol: symbol.to_uppercase(),
            overall_bias,
            strength: ConfluenceStrength::from_agreeing(agreeing),
            score,
            agreeing,
            timeframes,
        }
    }
}
