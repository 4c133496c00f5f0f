//! Evaluation loop tying candles, indicators, policy and state together.

use super::confluence::ConfluenceEngine;
use super::divergence::DivergenceDetector;
use super::indicators::compute_snapshot;
use super::policy::{PolicyInputs, PolicyOutcome, SignalPolicy};
use super::repository::SignalRepository;
use super::state::{Evaluation, MarketView, SignalStateStore, Transition};
use super::trend::HtfTrendDetector;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::services::{CandleFetch, CandleStore, Clock};
use crate::types::{
    ConfluenceResult, DivergenceResult, HtfTrend, IndicatorSnapshot, Signal, Timeframe,
};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Everything produced by one symbol's evaluation.
#[derive(Debug, Clone)]
pub struct SymbolReport {
    pub symbol: String,
    pub confluence: ConfluenceResult,
    pub divergence: DivergenceResult,
    pub htf_trend: HtfTrend,
    pub outcome: PolicyOutcome,
    pub evaluation: Evaluation,
    /// Some input came from stale fallback candles.
    pub provisional: bool,
}

/// Per-timeframe fetch results for one symbol.
struct MarketData {
    fetches: Vec<(Timeframe, Option<CandleFetch>)>,
    snapshots: Vec<(Timeframe, Option<IndicatorSnapshot>)>,
    provisional: bool,
}

impl MarketData {
    fn fetch(&self, timeframe: Timeframe) -> Option<&CandleFetch> {
        self.fetches
            .iter()
            .find(|(tf, _)| *tf == timeframe)
            .and_then(|(_, f)| f.as_ref())
    }

    fn snapshot(&self, timeframe: Timeframe) -> Option<&IndicatorSnapshot> {
        self.snapshots
            .iter()
            .find(|(tf, _)| *tf == timeframe)
            .and_then(|(_, s)| s.as_ref())
    }
}

pub struct SignalEngine {
    candles: Arc<CandleStore>,
    state: SignalStateStore,
    confluence: ConfluenceEngine,
    divergence: DivergenceDetector,
    trend: HtfTrendDetector,
    policy: SignalPolicy,
    clock: Arc<dyn Clock>,
    config: Config,
}

impl SignalEngine {
    pub fn new(
        config: Config,
        candles: Arc<CandleStore>,
        repository: Arc<dyn SignalRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            candles,
            state: SignalStateStore::new(repository, clock.clone(), config.state.clone()),
            confluence: ConfluenceEngine::new(config.confluence.clone()),
            divergence: DivergenceDetector::default(),
            trend: HtfTrendDetector::default(),
            policy: SignalPolicy::new(config.policy.clone()),
            clock,
            config,
        }
    }

    /// Restore persisted signals. Call once before the first cycle.
    pub async fn load_state(&self) -> Result<usize> {
        self.state.load().await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn candle_store(&self) -> &Arc<CandleStore> {
        &self.candles
    }

    /// Fetch every timeframe in parallel. Failed timeframes are logged and left empty.
    async fn gather(&self, symbol: &str) -> MarketData {
        let results = join_all(Timeframe::ALL.iter().map(|&tf| async move {
            (tf, self.candles.get_candles(symbol, tf).await)
        }))
        .await;

        let now = self.clock.now();
        let mut provisional = false;
        let mut fetches = Vec::with_capacity(results.len());
        let mut snapshots = Vec::with_capacity(results.len());

        for (tf, result) in results {
            match result {
                Ok(fetch) => {
                    if let Some(stale) = fetch.stale_error(now) {
                        warn!("{}", stale);
                        provisional = true;
                    }
                    snapshots.push((tf, Some(compute_snapshot(&fetch.series))));
                    fetches.push((tf, Some(fetch)));
                }
                Err(e) => {
                    warn!("No {} candles for {}: {}", tf, symbol, e);
                    snapshots.push((tf, None));
                    fetches.push((tf, None));
                }
            }
        }

        MarketData {
            fetches,
            snapshots,
            provisional,
        }
    }

    /// Current cross-timeframe confluence for `symbol`.
    pub async fn get_confluence(&self, symbol: &str) -> ConfluenceResult {
        let data = self.gather(symbol).await;
        self.confluence.combine(symbol, &data.snapshots)
    }

    /// Run one full evaluation for `symbol` and apply it to the signal state.
    pub async fn evaluate_symbol(&self, symbol: &str) -> Result<SymbolReport> {
        let symbol = symbol.trim().to_uppercase();
        let data = self.gather(&symbol).await;

        let primary_tf = self.config.primary_timeframe;
        let Some(primary) = data.snapshot(primary_tf) else {
            return Err(EngineError::NoDataAvailable {
                symbol,
                timeframe: primary_tf,
            });
        };

        let htf_series = data.fetch(self.config.htf_timeframe).map(|f| &f.series);
        let htf_trend = htf_series
            .map(|s| self.trend.detect(s))
            .unwrap_or(HtfTrend::Neutral);
        let divergence = htf_series
            .map(|s| self.divergence.detect(s))
            .unwrap_or_else(|| {
                DivergenceResult::none(self.config.htf_timeframe, "No reference candles")
            });

        let confluence = self.confluence.combine(&symbol, &data.snapshots);
        let outcome = self.policy.decide(&PolicyInputs {
            confluence: &confluence,
            primary,
            divergence: &divergence,
            htf_trend,
        });

        match &outcome {
            PolicyOutcome::NoSignal { reason } => debug!("{}: no signal ({})", symbol, reason),
            PolicyOutcome::Rejected { candidate, gate } => debug!(
                "{}: {} candidate ({}) rejected at {} gate",
                symbol, candidate.bias, candidate.source, gate
            ),
            PolicyOutcome::Accepted(candidate) => debug!(
                "{}: {} candidate accepted at {:.1}%",
                symbol, candidate.bias, candidate.confidence
            ),
        }

        let market = MarketView {
            price: primary.last_close,
            htf_trend,
            provisional: data.provisional,
        };
        let evaluation = self.state.evaluate(&symbol, &outcome, &market).await?;

        Ok(SymbolReport {
            symbol,
            confluence,
            divergence,
            htf_trend,
            outcome,
            evaluation,
            provisional: data.provisional,
        })
    }

    /// Evaluate every tracked symbol in parallel. One symbol failing never affects another.
    pub async fn evaluate_all(&self) -> Vec<(String, Result<SymbolReport>)> {
        let results = join_all(self.config.tracked_symbols.iter().map(|symbol| async move {
            (symbol.clone(), self.evaluate_symbol(symbol).await)
        }))
        .await;

        let mut changed = 0;
        for (symbol, result) in &results {
            match result {
                Ok(report) => {
                    if !matches!(
                        report.evaluation.transition,
                        Transition::Unchanged | Transition::Idle
                    ) {
                        changed += 1;
                    }
                }
                Err(e) => error!("Evaluation failed for {}: {}", symbol, e),
            }
        }
        info!(
            "Evaluated {} symbols, {} signal changes",
            results.len(),
            changed
        );

        results
    }

    /// Unexpired signals, sorted by symbol.
    pub async fn get_active_signals(&self) -> Vec<Signal> {
        self.state.active_signals(self.clock.now()).await
    }

    pub async fn get_signal(&self, symbol: &str) -> Option<Signal> {
        self.state.get(symbol).await
    }

    /// Evaluate on a fixed interval until `shutdown` fires. An in-flight cycle
    /// always completes before the loop exits.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "Signal engine started: {} symbols every {}s",
            self.config.tracked_symbols.len(),
            self.config.eval_interval.as_secs()
        );
        let mut ticker = interval(self.config.eval_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.evaluate_all().await;
                    let purged = self.state.purge_expired().await;
                    if purged > 0 {
                        debug!("Purged {} expired signals", purged);
                    }
                }
                _ = shutdown.recv() => {
                    info!("Signal engine received shutdown signal");
                    break;
                }
            }
        }
    }
}
