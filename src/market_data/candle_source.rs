// =============================================================================
// Candle Source — public daily klines from the market-data REST API
// =============================================================================
//
// GET /api/v3/klines?symbol=..&interval=1d&limit=180 (public, unsigned).
//
// The response is an array of positional arrays:
//   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
//   [6] closeTime, [7..] ignored
//
// Prices stay as text here; conversion to f64 happens in the trend engine.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Production market-data endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Candle interval used for trend scoring.
pub const DAILY_INTERVAL: &str = "1d";

/// Number of daily candles requested per symbol.
pub const HISTORY_LIMIT: u32 = 180;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One OHLCV candle with decimal fields carried as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub close_time: i64,
}

/// Fetches historical candles. Every call hits the network; nothing is cached.
#[derive(Debug, Clone)]
pub struct CandleSource {
    base_url: String,
    client: reqwest::Client,
}

impl CandleSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build market-data HTTP client")?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The last [`HISTORY_LIMIT`] daily candles for `symbol`, oldest first.
    pub async fn fetch_daily(&self, symbol: &str) -> Result<Vec<Candle>> {
        self.fetch(symbol, DAILY_INTERVAL, HISTORY_LIMIT).await
    }

    /// GET /api/v3/klines for an arbitrary interval and limit.
    #[instrument(skip(self), name = "market_data::fetch")]
    pub async fn fetch(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit = limit.to_string();

        let resp = self
            .client
            .get(&url)
            .query(&[("symbol", symbol), ("interval", interval), ("limit", limit.as_str())])
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .context("failed to read klines response")?;

        if !status.is_success() {
            anyhow::bail!("GET /api/v3/klines returned {}: {}", status, body);
        }

        let candles = parse_klines(&body)?;
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

/// Decode the positional kline array. Any malformed entry fails the whole
/// response.
pub fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let raw: Vec<Vec<serde_json::Value>> =
        serde_json::from_str(body).context("klines response is not an array of arrays")?;

    raw.iter()
        .enumerate()
        .map(|(i, entry)| parse_entry(entry).with_context(|| format!("malformed kline entry {i}")))
        .collect()
}

fn parse_entry(arr: &[serde_json::Value]) -> Result<Candle> {
    if arr.len() < 7 {
        anyhow::bail!("expected at least 7 elements, got {}", arr.len());
    }

    Ok(Candle {
        open_time: int_at(arr, 0, "openTime")?,
        open: text_at(arr, 1, "open")?,
        high: text_at(arr, 2, "high")?,
        low: text_at(arr, 3, "low")?,
        close: text_at(arr, 4, "close")?,
        volume: text_at(arr, 5, "volume")?,
        close_time: int_at(arr, 6, "closeTime")?,
    })
}

fn int_at(arr: &[serde_json::Value], idx: usize, name: &str) -> Result<i64> {
    arr[idx]
        .as_i64()
        .with_context(|| format!("{name} is not an integer: {}", arr[idx]))
}

/// Decimal fields are strings on the wire; bare numbers are kept as their
/// JSON text.
fn text_at(arr: &[serde_json::Value], idx: usize, name: &str) -> Result<String> {
    match &arr[idx] {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => anyhow::bail!("{name} is not a decimal string: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const SAMPLE: &str = r#"[
        [1709251200000, "61130.98", "63114.23", "60777.00", "62387.90", "47737.93", 1709337599999, "2952096578.75", 2071193, "24047.19", "1487309034.71", "0"],
        [1709337600000, "62387.90", "62433.19", "61561.12", "61987.28", "25534.73", 1709423999999, "1583401818.92", 1386224, "12266.04", "760702010.48", "0"]
    ]"#;

    #[test]
    fn parses_positional_entries() {
        let candles = parse_klines(SAMPLE).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, 1_709_251_200_000);
        assert_eq!(candles[0].close, "62387.90");
        assert_eq!(candles[1].volume, "25534.73");
        assert_eq!(candles[1].close_time, 1_709_423_999_999);
    }

    #[test]
    fn close_text_is_not_reformatted() {
        let candles = parse_klines(r#"[[1, "1", "1", "1", "0.10000000", "1", 2]]"#).unwrap();
        assert_eq!(candles[0].close, "0.10000000");
    }

    #[test]
    fn short_entry_is_an_error() {
        let err = parse_klines(r#"[[1, "1", "1", "1", "1"]]"#).unwrap_err();
        assert!(format!("{err:#}").contains("at least 7"));
    }

    #[test]
    fn non_integer_open_time_is_an_error() {
        assert!(parse_klines(r#"[["x", "1", "1", "1", "1", "1", 2]]"#).is_err());
    }

    #[test]
    fn non_array_body_is_an_error() {
        assert!(parse_klines(r#"{"code":-1121,"msg":"Invalid symbol."}"#).is_err());
    }

    #[test]
    fn empty_array_is_empty_series() {
        assert!(parse_klines("[]").unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_daily_sends_expected_query() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), "BTCUSDT".into()),
                Matcher::UrlEncoded("interval".into(), "1d".into()),
                Matcher::UrlEncoded("limit".into(), "180".into()),
            ]))
            .with_status(200)
            .with_body(SAMPLE)
            .create_async()
            .await;

        let source = CandleSource::new().unwrap().with_base_url(server.url());
        let candles = source.fetch_daily("BTCUSDT").await.unwrap();
        assert_eq!(candles.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_propagates() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-1121,"msg":"Invalid symbol."}"#)
            .create_async()
            .await;

        let source = CandleSource::new().unwrap().with_base_url(server.url());
        let err = source.fetch_daily("NOPE").await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
