use super::{check_status, http_client, CandleProvider};
use crate::error::{EngineError, Result};
use crate::types::{Candle, Timeframe};
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

const KUCOIN_API_URL: &str = "https://api.kucoin.com/api/v1";
const NAME: &str = "kucoin";

/// KuCoin candles response.
#[derive(Debug, Deserialize)]
struct KuCoinResponse {
    code: String,
    #[serde(default)]
    data: Vec<KuCoinCandle>,
    msg: Option<String>,
}

/// [time (s), open, close, high, low, volume, turnover], all strings.
type KuCoinCandle = Vec<String>;

/// KuCoin public candles client.
#[derive(Clone)]
pub struct KuCoinClient {
    client: Client,
    base_url: String,
}

impl KuCoinClient {
    pub fn new() -> Self {
        Self::with_base_url(KUCOIN_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Trading pair for a symbol, e.g. `BTC-USDT`.
    pub fn pair(symbol: &str) -> String {
        format!("{}-USDT", symbol.trim().to_uppercase())
    }

    pub fn candle_type(timeframe: Timeframe) -> &'static str {
        match timeframe {
            Timeframe::M15 => "15min",
            Timeframe::H1 => "1hour",
            Timeframe::H4 => "4hour",
            Timeframe::D1 => "1day",
            Timeframe::W1 => "1week",
        }
    }

    /// Without a `startAt`/`endAt` window the endpoint answers with the most
    /// recent candles, newest first.
    fn candles_url(&self, symbol: &str, timeframe: Timeframe) -> String {
        format!(
            "{}/market/candles?type={}&symbol={}",
            self.base_url,
            Self::candle_type(timeframe),
            Self::pair(symbol)
        )
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = self.candles_url(symbol, timeframe);
        debug!("Fetching KuCoin candles: {}", url);

        let response = check_status(NAME, self.client.get(&url).send().await?).await?;
        let body: KuCoinResponse = response.json().await?;
        parse_response(body, limit)
    }
}

impl Default for KuCoinClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_response(body: KuCoinResponse, limit: usize) -> Result<Vec<Candle>> {
    if body.code != "200000" {
        return Err(EngineError::provider(
            NAME,
            format!("code {}: {}", body.code, body.msg.unwrap_or_default()),
        ));
    }

    let num = |row: &KuCoinCandle, i: usize| -> Result<f64> {
        row.get(i)
            .and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| EngineError::MalformedData(format!("kucoin field {} invalid", i)))
    };

    // Newest first; keep the most recent `limit` and flip to oldest first.
    let mut candles = body
        .data
        .iter()
        .take(limit)
        .map(|row| -> Result<Candle> {
            Ok(Candle {
                timestamp: num(row, 0)? as i64 * 1000,
                open: num(row, 1)?,
                close: num(row, 2)?,
                high: num(row, 3)?,
                low: num(row, 4)?,
                volume: num(row, 5)?,
            })
        })
        .collect::<Result<Vec<Candle>>>()?;
    candles.reverse();
    Ok(candles)
}

impl CandleProvider for KuCoinClient {
    fn name(&self) -> &str {
        NAME
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>> {
        Box::pin(self.fetch_candles(symbol, timeframe, limit))
    }
}
