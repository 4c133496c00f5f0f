//! Signal policy: turns confluence, divergence and the primary timeframe's
//! indicators into a gated candidate.
//!
//! A candidate comes from the composite score when it clears the minimum,
//! otherwise from a detected divergence, otherwise from the dominant
//! timeframe. Every candidate then runs the same gates in order; the first
//! failing gate rejects it.

use crate::config::PolicyConfig;
use crate::types::{
    Bias, ConfluenceResult, DivergenceResult, HtfTrend, IndicatorSnapshot, SignalSource,
    TradeLevels,
};
use std::fmt;

/// Gates that can veto a candidate, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gate {
    Volume,
    Agreement,
    RsiBuffer,
    Confirmation,
    Volatility,
    HtfTrend,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Volume => "volume",
            Gate::Agreement => "agreement",
            Gate::RsiBuffer => "rsi_buffer",
            Gate::Confirmation => "confirmation",
            Gate::Volatility => "volatility",
            Gate::HtfTrend => "htf_trend",
        }
    }
}

impl fmt::Display for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directional call before the state store decides what to do with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub symbol: String,
    pub bias: Bias,
    pub source: SignalSource,
    /// Score after any S/R bonus, 0-100.
    pub score: f64,
    pub modifier: f64,
    pub confidence: f64,
    pub levels: TradeLevels,
    pub htf_trend: HtfTrend,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyOutcome {
    NoSignal { reason: String },
    Accepted(Candidate),
    Rejected { candidate: Candidate, gate: Gate },
}

impl PolicyOutcome {
    pub fn accepted(&self) -> Option<&Candidate> {
        match self {
            PolicyOutcome::Accepted(c) => Some(c),
            _ => None,
        }
    }
}

/// Everything the policy looks at for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInputs<'a> {
    pub confluence: &'a ConfluenceResult,
    /// Snapshot of the primary timeframe; price and gate inputs come from here.
    pub primary: &'a IndicatorSnapshot,
    pub divergence: &'a DivergenceResult,
    pub htf_trend: HtfTrend,
}

#[derive(Debug, Clone, Default)]
pub struct SignalPolicy {
    config: PolicyConfig,
}

impl SignalPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn decide(&self, inputs: &PolicyInputs<'_>) -> PolicyOutcome {
        let Some((bias, source, score, modifier)) = self.select(inputs) else {
            return PolicyOutcome::NoSignal {
                reason: format!(
                    "score {:.1} below {:.0} with no divergence or dominant timeframe",
                    inputs.confluence.score, self.config.min_composite_score
                ),
            };
        };

        let mut candidate = Candidate {
            symbol: inputs.confluence.symbol.clone(),
            bias,
            source,
            score: score.min(100.0),
            modifier,
            confidence: self.confidence(score, modifier),
            levels: self.levels(bias, inputs.primary.last_close, source),
            htf_trend: inputs.htf_trend,
        };

        let snapshot = inputs.primary;

        if !snapshot
            .volume_ratio
            .is_some_and(|v| v >= self.config.min_volume_ratio)
        {
            return PolicyOutcome::Rejected { candidate, gate: Gate::Volume };
        }

        if self.agreement(bias, snapshot, inputs.htf_trend) < self.config.min_agreement {
            return PolicyOutcome::Rejected { candidate, gate: Gate::Agreement };
        }

        let rsi = snapshot.rsi_or_neutral();
        let buffer_veto = match bias {
            Bias::Buy => rsi >= self.config.veto_rsi_buy_at,
            Bias::Sell => rsi <= self.config.veto_rsi_sell_at,
            Bias::Hold => false,
        };
        if buffer_veto {
            return PolicyOutcome::Rejected { candidate, gate: Gate::RsiBuffer };
        }

        if self.near_level(bias, snapshot) {
            candidate.score = (candidate.score + self.config.sr_bonus).min(100.0);
            candidate.confidence = self.confidence(candidate.score, candidate.modifier);
        }

        let streak = snapshot.streak * bias.direction() as i32;
        if streak < self.config.min_streak as i32 {
            return PolicyOutcome::Rejected { candidate, gate: Gate::Confirmation };
        }

        if snapshot
            .recent_change_pct
            .is_some_and(|c| c.abs() > self.config.max_volatility_pct)
        {
            return PolicyOutcome::Rejected { candidate, gate: Gate::Volatility };
        }

        if !inputs.htf_trend.permits(bias) {
            return PolicyOutcome::Rejected { candidate, gate: Gate::HtfTrend };
        }

        PolicyOutcome::Accepted(candidate)
    }

    /// Direction, source, score and confidence modifier of the candidate, if any.
    fn select(&self, inputs: &PolicyInputs<'_>) -> Option<(Bias, SignalSource, f64, f64)> {
        let confluence = inputs.confluence;
        if confluence.overall_bias != Bias::Hold
            && confluence.score >= self.config.min_composite_score
        {
            return Some((
                confluence.overall_bias,
                SignalSource::Confluence,
                confluence.score,
                confluence.strength.confidence_modifier(),
            ));
        }

        // Hidden divergence only ever modifies; it never stands alone.
        let divergence = inputs.divergence;
        if divergence.kind.is_classic()
            && divergence.strength > self.config.min_divergence_strength
        {
            return Some((
                divergence.kind.bias(),
                SignalSource::Divergence,
                60.0 + 0.4 * divergence.strength,
                self.config.divergence_modifier,
            ));
        }

        confluence.dominant().map(|tb| {
            let rsi = tb.rsi.unwrap_or(50.0);
            (
                tb.bias,
                SignalSource::DominantTf,
                60.0 + (rsi - 50.0).abs(),
                self.config.dominant_modifier,
            )
        })
    }

    fn confidence(&self, score: f64, modifier: f64) -> f64 {
        (score * modifier).clamp(0.0, self.config.max_confidence)
    }

    /// Factors that point the same way as `bias`.
    fn agreement(&self, bias: Bias, snapshot: &IndicatorSnapshot, htf_trend: HtfTrend) -> usize {
        let dir = bias.direction();
        let rsi_zone = snapshot.rsi.is_some_and(|r| (r - 50.0) * dir < 0.0);
        let macd = snapshot.macd.is_some_and(|m| m.histogram * dir > 0.0);
        let momentum = snapshot.momentum_short.is_some_and(|m| m * dir > 0.0);
        let htf = htf_trend.agrees_with(bias);

        [rsi_zone, macd, momentum, htf]
            .iter()
            .filter(|agrees| **agrees)
            .count()
    }

    /// Price within the proximity band of support (BUY) or resistance (SELL).
    fn near_level(&self, bias: Bias, snapshot: &IndicatorSnapshot) -> bool {
        let price = snapshot.last_close;
        if price <= 0.0 {
            return false;
        }
        let level = match bias {
            Bias::Buy => snapshot.support,
            Bias::Sell => snapshot.resistance,
            Bias::Hold => None,
        };
        level.is_some_and(|l| ((price - l) / price * 100.0).abs() <= self.config.sr_proximity_pct)
    }

    /// Entry band and protective levels around `price`.
    pub fn levels(&self, bias: Bias, price: f64, source: SignalSource) -> TradeLevels {
        let band = price * self.config.entry_band_pct / 100.0;
        let take_profit_pct = match source {
            SignalSource::Divergence => self.config.divergence_take_profit_pct,
            _ => self.config.take_profit_pct,
        };
        let (stop_loss, take_profit) = match bias {
            Bias::Sell => (
                price * (1.0 + self.config.stop_loss_pct / 100.0),
                price * (1.0 - take_profit_pct / 100.0),
            ),
            _ => (
                price * (1.0 - self.config.stop_loss_pct / 100.0),
                price * (1.0 + take_profit_pct / 100.0),
            ),
        };

        TradeLevels {
            entry_price: price,
            entry_low: price - band,
            entry_high: price + band,
            stop_loss,
            take_profit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ConfluenceStrength, DivergenceKind, MacdValue, Timeframe, TimeframeBias,
    };

    fn confluence(bias: Bias, score: f64, agreeing: usize) -> ConfluenceResult {
        ConfluenceResult {
            symbol: "BTC".into(),
            overall_bias: bias,
            strength: ConfluenceStrength::from_agreeing(agreeing),
            score,
            agreeing,
            timeframes: vec![
                TimeframeBias {
                    timeframe: Timeframe::H1,
                    bias: Bias::Hold,
                    weight: 2.0,
                    rsi: Some(50.0),
                },
                TimeframeBias {
                    timeframe: Timeframe::D1,
                    bias,
                    weight: 4.0,
                    rsi: Some(if bias == Bias::Sell { 62.0 } else { 38.0 }),
                },
            ],
        }
    }

    /// A primary snapshot that passes every BUY gate.
    fn bullish_snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            timeframe: Timeframe::H1,
            periods: 100,
            rsi: Some(48.0),
            macd: Some(MacdValue {
                line: 0.5,
                signal: 0.3,
                histogram: 0.2,
            }),
            support: Some(90.0),
            resistance: Some(110.0),
            momentum_short: Some(1.2),
            momentum_long: Some(3.0),
            volume_ratio: Some(1.4),
            last_close: 100.0,
            recent_change_pct: Some(4.0),
            streak: 3,
        }
    }

    fn no_divergence() -> DivergenceResult {
        DivergenceResult::none(Timeframe::H4, "No divergence detected")
    }

    fn decide(
        confluence: &ConfluenceResult,
        snapshot: &IndicatorSnapshot,
        divergence: &DivergenceResult,
        htf_trend: HtfTrend,
    ) -> PolicyOutcome {
        SignalPolicy::default().decide(&PolicyInputs {
            confluence,
            primary: snapshot,
            divergence,
            htf_trend,
        })
    }

    fn rejected_gate(outcome: PolicyOutcome) -> Gate {
        match outcome {
            PolicyOutcome::Rejected { gate, .. } => gate,
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_confluence_candidate_accepted() {
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &bullish_snapshot(),
            &no_divergence(),
            HtfTrend::Neutral,
        );
        let candidate = outcome.accepted().expect("accepted");
        assert_eq!(candidate.bias, Bias::Buy);
        assert_eq!(candidate.source, SignalSource::Confluence);
        assert!((candidate.confidence - 72.0).abs() < 1e-9);
        assert!((candidate.levels.stop_loss - 97.0).abs() < 1e-9);
        assert!((candidate.levels.take_profit - 108.0).abs() < 1e-9);
        assert!((candidate.levels.entry_low - 99.5).abs() < 1e-9);
        assert!((candidate.levels.entry_high - 100.5).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_is_capped() {
        let mut snapshot = bullish_snapshot();
        snapshot.support = Some(99.0);
        let outcome = decide(
            &confluence(Bias::Buy, 100.0, 5),
            &snapshot,
            &no_divergence(),
            HtfTrend::Bullish,
        );
        assert_eq!(outcome.accepted().map(|c| c.confidence), Some(98.0));
    }

    #[test]
    fn test_support_proximity_adds_bonus() {
        let mut snapshot = bullish_snapshot();
        snapshot.support = Some(98.5);
        let outcome = decide(
            &confluence(Bias::Buy, 70.0, 2),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        let candidate = outcome.accepted().expect("accepted");
        assert!((candidate.score - 80.0).abs() < 1e-9);
        assert!((candidate.confidence - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_low_score_without_fallback_is_no_signal() {
        let mut weak = confluence(Bias::Buy, 40.0, 1);
        weak.timeframes.iter_mut().for_each(|tb| tb.bias = Bias::Hold);
        let outcome = decide(&weak, &bullish_snapshot(), &no_divergence(), HtfTrend::Neutral);
        assert!(matches!(outcome, PolicyOutcome::NoSignal { .. }));
    }

    #[test]
    fn test_divergence_fallback() {
        let divergence = DivergenceResult {
            kind: DivergenceKind::Bullish,
            strength: 50.0,
            timeframe: Timeframe::H4,
            description: "test".into(),
        };
        let outcome = decide(
            &confluence(Bias::Sell, 30.0, 1),
            &bullish_snapshot(),
            &divergence,
            HtfTrend::Neutral,
        );
        let candidate = outcome.accepted().expect("accepted");
        assert_eq!(candidate.source, SignalSource::Divergence);
        assert_eq!(candidate.bias, Bias::Buy);
        // (60 + 0.4 * 50) * 0.85
        assert!((candidate.confidence - 68.0).abs() < 1e-9);
        assert!((candidate.levels.take_profit - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_hidden_or_weak_divergence_falls_through_to_dominant() {
        let hidden = DivergenceResult {
            kind: DivergenceKind::HiddenBullish,
            strength: 90.0,
            timeframe: Timeframe::H4,
            description: "higher low, lower RSI low".into(),
        };
        let weak = DivergenceResult {
            kind: DivergenceKind::Bullish,
            strength: 40.0,
            timeframe: Timeframe::H4,
            description: "lower low, higher RSI low".into(),
        };

        for divergence in [hidden, weak] {
            let outcome = decide(
                &confluence(Bias::Buy, 50.0, 1),
                &bullish_snapshot(),
                &divergence,
                HtfTrend::Neutral,
            );
            let candidate = outcome.accepted().expect("accepted");
            assert_eq!(candidate.source, SignalSource::DominantTf, "{:?}", divergence.kind);
            assert!((candidate.confidence - 50.4).abs() < 1e-9);
            assert!((candidate.levels.take_profit - 108.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_dominant_timeframe_fallback() {
        let outcome = decide(
            &confluence(Bias::Buy, 50.0, 1),
            &bullish_snapshot(),
            &no_divergence(),
            HtfTrend::Neutral,
        );
        let candidate = outcome.accepted().expect("accepted");
        assert_eq!(candidate.source, SignalSource::DominantTf);
        // (60 + |38 - 50|) * 0.70
        assert!((candidate.confidence - 50.4).abs() < 1e-9);
    }

    #[test]
    fn test_low_volume_vetoes() {
        let mut snapshot = bullish_snapshot();
        snapshot.volume_ratio = Some(0.8);
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        assert_eq!(rejected_gate(outcome), Gate::Volume);

        snapshot.volume_ratio = None;
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        assert_eq!(rejected_gate(outcome), Gate::Volume);
    }

    #[test]
    fn test_insufficient_agreement_vetoes() {
        let mut snapshot = bullish_snapshot();
        snapshot.rsi = Some(52.0);
        snapshot.macd = Some(MacdValue {
            line: 0.1,
            signal: 0.3,
            histogram: -0.2,
        });
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        assert_eq!(rejected_gate(outcome), Gate::Agreement);
    }

    #[test]
    fn test_rsi_buffer_vetoes_overbought_buy() {
        let mut snapshot = bullish_snapshot();
        snapshot.rsi = Some(60.0);
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        assert_eq!(rejected_gate(outcome), Gate::RsiBuffer);
    }

    #[test]
    fn test_rsi_buffer_vetoes_oversold_sell() {
        let snapshot = IndicatorSnapshot {
            rsi: Some(40.0),
            macd: Some(MacdValue {
                line: -0.5,
                signal: -0.3,
                histogram: -0.2,
            }),
            momentum_short: Some(-1.0),
            streak: -3,
            ..bullish_snapshot()
        };
        let outcome = decide(
            &confluence(Bias::Sell, 80.0, 3),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        assert_eq!(rejected_gate(outcome), Gate::RsiBuffer);
    }

    #[test]
    fn test_missing_confirmation_vetoes() {
        let mut snapshot = bullish_snapshot();
        snapshot.streak = 1;
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        assert_eq!(rejected_gate(outcome), Gate::Confirmation);
    }

    #[test]
    fn test_volatility_vetoes() {
        let mut snapshot = bullish_snapshot();
        snapshot.recent_change_pct = Some(-12.5);
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &snapshot,
            &no_divergence(),
            HtfTrend::Neutral,
        );
        assert_eq!(rejected_gate(outcome), Gate::Volatility);
    }

    #[test]
    fn test_htf_trend_vetoes_counter_trend() {
        let outcome = decide(
            &confluence(Bias::Buy, 80.0, 3),
            &bullish_snapshot(),
            &no_divergence(),
            HtfTrend::Bearish,
        );
        assert_eq!(rejected_gate(outcome), Gate::HtfTrend);
    }

    #[test]
    fn test_sell_levels_are_mirrored() {
        let levels = SignalPolicy::default().levels(Bias::Sell, 200.0, SignalSource::Confluence);
        assert!((levels.stop_loss - 206.0).abs() < 1e-9);
        assert!((levels.take_profit - 184.0).abs() < 1e-9);
        assert!((levels.entry_low - 199.0).abs() < 1e-9);
    }
}
