//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use omen::error::{EngineError, Result};
use omen::sources::CandleProvider;
use omen::types::{Candle, Timeframe};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// Candles with a 0.1% wick around each close.
pub fn candles_from_closes(closes: &[f64], volumes: Option<&[f64]>) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            timestamp: 1_700_000_000_000 + i as i64 * 3_600_000,
            open: close,
            high: close * 1.001,
            low: close * 0.999,
            close,
            volume: volumes.map(|v| v[i]).unwrap_or(1000.0),
        })
        .collect()
}

/// What a scripted provider does on each call.
#[derive(Clone)]
pub enum Script {
    Serve(HashMap<Timeframe, Vec<Candle>>),
    /// Per-symbol data; unknown symbols fail.
    BySymbol(HashMap<String, HashMap<Timeframe, Vec<Candle>>>),
    Fail,
    Hang,
}

/// Provider driven by a fixed script, counting its calls.
pub struct ScriptedProvider {
    name: String,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            calls: AtomicUsize::new(0),
        }
    }

    /// Serve the same candles for every timeframe.
    pub fn serving(name: &str, candles: Vec<Candle>) -> Self {
        let map = Timeframe::ALL.iter().map(|tf| (*tf, candles.clone())).collect();
        Self::new(name, Script::Serve(map))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CandleProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        _limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Serve(map) => map.get(&timeframe).cloned().ok_or_else(|| {
                    EngineError::provider(&self.name, format!("no {} data for {}", timeframe, symbol))
                }),
                Script::BySymbol(symbols) => symbols
                    .get(symbol)
                    .and_then(|map| map.get(&timeframe))
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::provider(&self.name, format!("unknown symbol {}", symbol))
                    }),
                Script::Fail => Err(EngineError::provider(&self.name, "HTTP 503")),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Vec::new())
                }
            }
        })
    }
}
