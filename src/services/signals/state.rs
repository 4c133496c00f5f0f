//! Active signal state per symbol.
//!
//! Each symbol has its own async mutex, so a read-modify-write of one
//! symbol never interleaves with another evaluation of the same symbol.
//! Every mutation goes to the repository before memory is updated.

use super::policy::{Candidate, PolicyOutcome};
use super::repository::SignalRepository;
use crate::config::StateConfig;
use crate::error::Result;
use crate::services::Clock;
use crate::types::{HtfTrend, LevelHit, Signal};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    StopLoss,
    TakeProfit,
    HtfReversal,
    Expired,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InvalidationReason::StopLoss => "stop-loss hit",
            InvalidationReason::TakeProfit => "take-profit hit",
            InvalidationReason::HtfReversal => "HTF trend reversed",
            InvalidationReason::Expired => "expired",
        })
    }
}

/// What an evaluation did to the symbol's active signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    /// Replaced by an opposite-direction signal.
    Flipped,
    /// Same direction; confidence and entry band updated.
    Refreshed,
    /// Opposite candidate arrived inside the debounce window.
    Debounced,
    Invalidated(InvalidationReason),
    /// Active signal kept, nothing accepted this cycle.
    Unchanged,
    /// No active signal and nothing accepted.
    Idle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub signal: Option<Signal>,
    pub transition: Transition,
}

/// Current market facts the state store checks an active signal against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketView {
    pub price: f64,
    pub htf_trend: HtfTrend,
    /// Inputs came from stale fallback candles.
    pub provisional: bool,
}

type Slot = Arc<Mutex<Option<Signal>>>;

pub struct SignalStateStore {
    slots: DashMap<String, Slot>,
    repository: Arc<dyn SignalRepository>,
    clock: Arc<dyn Clock>,
    config: StateConfig,
}

impl SignalStateStore {
    pub fn new(
        repository: Arc<dyn SignalRepository>,
        clock: Arc<dyn Clock>,
        config: StateConfig,
    ) -> Self {
        Self {
            slots: DashMap::new(),
            repository,
            clock,
            config,
        }
    }

    fn slot(&self, symbol: &str) -> Slot {
        self.slots
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Load persisted signals. Expired entries are deleted instead of loaded.
    pub async fn load(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut loaded = 0;

        for signal in self.repository.load_all()? {
            if signal.is_expired(now) {
                info!(
                    "Dropping expired {} signal for {} (expired {})",
                    signal.bias, signal.symbol, signal.expires_at
                );
                self.repository.remove(&signal.symbol)?;
                continue;
            }
            let slot = self.slot(&signal.symbol);
            *slot.lock().await = Some(signal);
            loaded += 1;
        }

        info!("Loaded {} active signals", loaded);
        Ok(loaded)
    }

    /// Apply one policy outcome to the symbol's state.
    pub async fn evaluate(
        &self,
        symbol: &str,
        outcome: &PolicyOutcome,
        market: &MarketView,
    ) -> Result<Evaluation> {
        let symbol = symbol.to_uppercase();
        let slot = self.slot(&symbol);
        let mut current = slot.lock().await;
        let now = self.clock.now();

        if let Some(active) = current.as_ref() {
            if let Some(reason) = Self::invalidation(active, market, now) {
                self.repository.remove(&symbol)?;
                info!("Invalidated {} signal for {}: {}", active.bias, symbol, reason);
                *current = None;
                return Ok(Evaluation {
                    signal: None,
                    transition: Transition::Invalidated(reason),
                });
            }
        }

        let Some(candidate) = outcome.accepted() else {
            let transition = if current.is_some() {
                Transition::Unchanged
            } else {
                Transition::Idle
            };
            return Ok(Evaluation {
                signal: current.clone(),
                transition,
            });
        };

        let (next, transition) = match current.as_ref() {
            None => (self.open(&symbol, candidate, market, now), Transition::Created),
            Some(active) if active.bias == candidate.bias => {
                (Self::refresh(active, candidate, market), Transition::Refreshed)
            }
            Some(active) => {
                let held = now - active.last_changed_at;
                if held < self.config.debounce() {
                    debug!(
                        "Debounced {} -> {} for {} ({}s since last change)",
                        active.bias,
                        candidate.bias,
                        symbol,
                        held.num_seconds()
                    );
                    return Ok(Evaluation {
                        signal: Some(active.clone()),
                        transition: Transition::Debounced,
                    });
                }
                (self.open(&symbol, candidate, market, now), Transition::Flipped)
            }
        };

        self.repository.upsert(&next)?;
        match transition {
            Transition::Refreshed => debug!(
                "Refreshed {} signal for {} at {:.1}% confidence",
                next.bias, symbol, next.confidence
            ),
            _ => info!(
                "{:?} {} signal for {} at {:.1}% confidence ({})",
                transition, next.bias, symbol, next.confidence, next.source
            ),
        }
        *current = Some(next.clone());

        Ok(Evaluation {
            signal: Some(next),
            transition,
        })
    }

    fn invalidation(
        active: &Signal,
        market: &MarketView,
        now: DateTime<Utc>,
    ) -> Option<InvalidationReason> {
        if let Some(hit) = active.level_crossed(market.price) {
            return Some(match hit {
                LevelHit::StopLoss => InvalidationReason::StopLoss,
                LevelHit::TakeProfit => InvalidationReason::TakeProfit,
            });
        }
        if !market.htf_trend.permits(active.bias) {
            return Some(InvalidationReason::HtfReversal);
        }
        if active.is_expired(now) {
            return Some(InvalidationReason::Expired);
        }
        None
    }

    fn open(
        &self,
        symbol: &str,
        candidate: &Candidate,
        market: &MarketView,
        now: DateTime<Utc>,
    ) -> Signal {
        let levels = candidate.levels;
        Signal {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            bias: candidate.bias,
            confidence: candidate.confidence,
            entry_price: levels.entry_price,
            entry_low: levels.entry_low,
            entry_high: levels.entry_high,
            stop_loss: levels.stop_loss,
            take_profit: levels.take_profit,
            htf_trend: candidate.htf_trend,
            source: candidate.source,
            provisional: market.provisional,
            created_at: now,
            last_changed_at: now,
            expires_at: now + self.config.signal_ttl(),
        }
    }

    /// Same-direction update. Protective levels and timestamps stay put.
    fn refresh(active: &Signal, candidate: &Candidate, market: &MarketView) -> Signal {
        Signal {
            confidence: candidate.confidence,
            entry_price: candidate.levels.entry_price,
            entry_low: candidate.levels.entry_low,
            entry_high: candidate.levels.entry_high,
            htf_trend: candidate.htf_trend,
            source: candidate.source,
            provisional: market.provisional,
            ..active.clone()
        }
    }

    /// Active signal for `symbol`, if unexpired.
    pub async fn get(&self, symbol: &str) -> Option<Signal> {
        let slot = self.slots.get(&symbol.to_uppercase())?.clone();
        let now = self.clock.now();
        let current = slot.lock().await;
        current.as_ref().filter(|s| !s.is_expired(now)).cloned()
    }

    /// Every unexpired signal at `now`, sorted by symbol.
    pub async fn active_signals(&self, now: DateTime<Utc>) -> Vec<Signal> {
        let slots: Vec<Slot> = self.slots.iter().map(|e| e.value().clone()).collect();
        let mut signals = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(signal) = slot.lock().await.as_ref() {
                if !signal.is_expired(now) {
                    signals.push(signal.clone());
                }
            }
        }
        signals.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        signals
    }

    /// Drop every expired signal. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let slots: Vec<(String, Slot)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut purged = 0;
        for (symbol, slot) in slots {
            let mut current = slot.lock().await;
            if !current.as_ref().is_some_and(|s| s.is_expired(now)) {
                continue;
            }
            match self.repository.remove(&symbol) {
                Ok(()) => {
                    *current = None;
                    purged += 1;
                }
                Err(e) => warn!("Failed to remove expired signal for {}: {}", symbol, e),
            }
        }
        purged
    }
}
