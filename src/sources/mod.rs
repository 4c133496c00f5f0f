//! Candle data providers.
//!
//! Each provider maps an engine symbol and timeframe onto its own REST
//! naming and returns raw candles oldest first. Validation happens in the
//! candle store, so a provider only fails on transport or decoding errors.

pub mod binance_us;
pub mod bybit;
pub mod cryptocompare;
pub mod kucoin;

pub use binance_us::BinanceUsClient;
pub use bybit::BybitClient;
pub use cryptocompare::CryptoCompareClient;
pub use kucoin::KuCoinClient;

use crate::config::FetchConfig;
use crate::error::{EngineError, Result};
use crate::types::{Candle, Timeframe};
use reqwest::{Client, Response};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A source of historical candles.
pub trait CandleProvider: Send + Sync {
    /// Short identifier used in logs and fetch results.
    fn name(&self) -> &str;

    /// Fetch up to `limit` candles, oldest first.
    fn fetch<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>>;
}

/// Providers in fallback priority order.
pub fn default_providers(config: &FetchConfig) -> Vec<Arc<dyn CandleProvider>> {
    vec![
        Arc::new(BinanceUsClient::new()),
        Arc::new(KuCoinClient::new()),
        Arc::new(CryptoCompareClient::new(config.cryptocompare_api_key.clone())),
        Arc::new(BybitClient::new()),
    ]
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .user_agent("Omen/1.0")
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Turn a non-2xx response into a provider error carrying a body excerpt.
pub(crate) async fn check_status(provider: &str, response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let excerpt: String = text.chars().take(200).collect();
    Err(EngineError::provider(
        provider,
        format!("HTTP {}: {}", status, excerpt),
    ))
}

/// Parse a numeric field that may arrive as a JSON string or number.
pub(crate) fn parse_field(provider: &str, value: &serde_json::Value) -> Result<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| EngineError::provider(provider, format!("bad numeric field {}", value)))
}
