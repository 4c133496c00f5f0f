use super::{check_status, http_client, parse_field, CandleProvider};
use crate::error::{EngineError, Result};
use crate::types::{Candle, Timeframe};
use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

const BINANCE_US_API_URL: &str = "https://api.binance.us/api/v3";
const NAME: &str = "binance_us";

/// Raw kline row: [openTime, open, high, low, close, volume, closeTime, ...].
type BinanceKline = Vec<serde_json::Value>;

/// Binance.US public klines client.
#[derive(Clone)]
pub struct BinanceUsClient {
    client: Client,
    base_url: String,
}

impl BinanceUsClient {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_US_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Trading pair for a symbol, e.g. `BTCUSDT`.
    pub fn pair(symbol: &str) -> String {
        format!("{}USDT", symbol.trim().to_uppercase())
    }

    pub fn interval(timeframe: Timeframe) -> &'static str {
        timeframe.as_str()
    }

    async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            Self::pair(symbol),
            Self::interval(timeframe),
            limit
        );
        debug!("Fetching Binance.US klines: {}", url);

        let response = check_status(NAME, self.client.get(&url).send().await?).await?;
        let rows: Vec<BinanceKline> = response.json().await?;
        parse_klines(&rows)
    }
}

impl Default for BinanceUsClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Binance returns klines oldest first with ms open times.
fn parse_klines(rows: &[BinanceKline]) -> Result<Vec<Candle>> {
    rows.iter()
        .map(|row| -> Result<Candle> {
            if row.len() < 6 {
                return Err(EngineError::MalformedData(format!(
                    "binance_us kline has {} fields",
                    row.len()
                )));
            }
            Ok(Candle {
                timestamp: parse_field(NAME, &row[0])? as i64,
                open: parse_field(NAME, &row[1])?,
                high: parse_field(NAME, &row[2])?,
                low: parse_field(NAME, &row[3])?,
                close: parse_field(NAME, &row[4])?,
                volume: parse_field(NAME, &row[5])?,
            })
        })
        .collect()
}

impl CandleProvider for BinanceUsClient {
    fn name(&self) -> &str {
        NAME
    }

    fn fetch<'a>(
        &'a self,
        symbol: &'a str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Candle>>> + Send + 'a>> {
        Box::pin(self.fetch_klines(symbol, timeframe, limit))
    }
}
