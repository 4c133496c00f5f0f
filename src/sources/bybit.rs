use super::{check_status, http_client, CandleProvider};
use crate::error::{EngineError, Result};
use crate::types::{Candle, Timeframe};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

const BYBIT_API_URL: &str = "https://api.bybit.com/v5/market";
const NAME: &str = "bybit";

/// Bybit v5 kline response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitResponse {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<BybitResult>,
}

#[derive(Debug, Deserialize)]
struct BybitResult {
    #[serde(default)]
    list: Vec<Vec<String>>,
}

/// Bybit v5 linear kline client.
#[derive(Clone)]
pub struct BybitClient {
    client: Client,
    base_url: String,
}

impl BybitClient {
    pub fn new() -> Self {
        Self::with_base_url(BYBIT_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn interval(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M15 => "15",
            Timeframe::H1 => "60",
            Timeframe::H4 => "240",
            Timeframe::D1 => "D",
            Timeframe::W1 => "W",
        }
    }

    async fn fetch_kline(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/kline?category=linear&symbol={}USDT&interval={}&limit={}",
            self.base_url,
            symbol.trim().to_uppercase(),
            Self::interval(timeframe),
            limit.min(1000)
        );
        debug!("Fetching Bybit kline: {}", url);

        let response = check_status(NAME, self.client.get(&url).send().await?).await?;
        let body: BybitResponse = response.json().await?;
        parse_response(body)
    }
}

impl Default for BybitClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_response(body: BybitResponse) -> Result<Vec<Candle>> {
    if body.ret_code != 0 {
        return Err(EngineError::provider(
            NAME,
            format!("retCode {}: {}", body.ret_code, body.ret_msg),
        ));
    }

    let rows = body.result.map(|r| r.list).unwrap_or_default();
    let num = |row: &[String], i: usize| -> Result<f64> {
        row.get(i)
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| EngineError::MalformedData(format!("bybit field {} invalid", i)))
    };

    // [startTime ms, open, high, low, close, volume, turnover], newest first.
    let mut candles = rows
        .iter()
        .map(|row| -> Result<Candle> {
            Ok(Candle {
                timestamp: num(row, 0)? as i64,
                open: num(row, 1)?,
                high: num(row, 2)?,
                low: num(row, 3)?,
                close: num(row, 4)?,
                volume: num(row, 5)?,
            })
        })
        .collect::<Result<Vec<Candle>>>()?;
    candles.reverse();
    Ok(candles)
}

impl CandleProvider for BybitClient {
    fn name(&self) -> &str {
        NAME
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>> {
        Box::pin(self.fetch_kline(symbol, timeframe, limit))
    }
}
