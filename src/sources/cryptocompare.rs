use super::{check_status, http_client, CandleProvider};
use crate::error::{EngineError, Result};
use crate::types::{Candle, Timeframe};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

const CRYPTOCOMPARE_API_URL: &str = "https://min-api.cryptocompare.com/data/v2";
const NAME: &str = "cryptocompare";

/// CryptoCompare histo* response.
#[derive(Debug, Deserialize)]
struct CryptoCompareResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data")]
    data: Option<CryptoCompareData>,
}

#[derive(Debug, Deserialize)]
struct CryptoCompareData {
    #[serde(rename = "Data", default)]
    data: Vec<CryptoCompareOhlc>,
}

#[derive(Debug, Deserialize)]
struct CryptoCompareOhlc {
    time: i64,
    high: f64,
    low: f64,
    open: f64,
    close: f64,
    #[serde(rename = "volumefrom", default)]
    volume_from: f64,
}

/// CryptoCompare historical OHLC client.
#[derive(Clone)]
pub struct CryptoCompareClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl CryptoCompareClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(CRYPTOCOMPARE_API_URL, api_key)
    }

    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: http_client(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Endpoint and aggregation factor for a timeframe.
    pub fn endpoint(timeframe: Timeframe) -> (&'static str, u32) {
        match timeframe {
            Timeframe::M15 => ("histominute", 15),
            Timeframe::H1 => ("histohour", 1),
            Timeframe::H4 => ("histohour", 4),
            Timeframe::D1 => ("histoday", 1),
            Timeframe::W1 => ("histoday", 7),
        }
    }

    async fn fetch_histo(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let (endpoint, aggregate) = Self::endpoint(timeframe);
        let url = format!(
            "{}/{}?fsym={}&tsym=USDT&limit={}&aggregate={}",
            self.base_url,
            endpoint,
            symbol.trim().to_uppercase(),
            limit.min(2000),
            aggregate
        );
        debug!("Fetching CryptoCompare {}: {}", endpoint, url);

        let mut request = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            request = request.header("authorization", format!("Apikey {}", key));
        }

        let response = check_status(NAME, request.send().await?).await?;
        let body: CryptoCompareResponse = response.json().await?;
        parse_response(body)
    }
}

fn parse_response(body: CryptoCompareResponse) -> Result<Vec<Candle>> {
    if body.response != "Success" {
        return Err(EngineError::provider(
            NAME,
            format!("{}: {}", body.response, body.message),
        ));
    }

    let data = body
        .data
        .ok_or_else(|| EngineError::provider(NAME, "response has no data"))?;

    // Zero-price rows are padding before the pair was listed.
    Ok(data
        .data
        .into_iter()
        .filter(|ohlc| ohlc.close > 0.0)
        .map(|ohlc| Candle {
            timestamp: ohlc.time * 1000,
            open: ohlc.open,
            high: ohlc.high,
            low: ohlc.low,
            close: ohlc.close,
            volume: ohlc.volume_from,
        })
        .collect())
}

impl CandleProvider for CryptoCompareClient {
    fn name(&self) -> &str {
        NAME
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>> {
        Box::pin(self.fetch_histo(symbol, timeframe, limit))
    }
}
