// =============================================================================
// Trend Service — recompute-and-store and latest-read operations
// =============================================================================
//
// One update pass:
//   1. take a single timestamp for the pass,
//   2. fetch daily candles and score every tracked asset concurrently,
//   3. append one row {asset scores..., timestamp} to the store.
//
// Any fetch failure aborts the pass before the store is touched. Candles are
// fetched fresh every time; nothing is cached.
// =============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::future::try_join_all;
use tracing::{info, instrument, warn};

use crate::config::TrackedAsset;
use crate::market_data::CandleSource;
use crate::storage::{TrendRow, TrendStore};
use crate::trend::engine::{self, TrendEvaluation, MIN_CLOSES};

pub struct TrendService {
    source: CandleSource,
    store: Arc<TrendStore>,
    assets: Vec<TrackedAsset>,
}

impl TrendService {
    pub fn new(source: CandleSource, store: Arc<TrendStore>, assets: Vec<TrackedAsset>) -> Self {
        Self {
            source,
            store,
            assets,
        }
    }

    pub fn assets(&self) -> &[TrackedAsset] {
        &self.assets
    }

    /// Fetch and evaluate one asset.
    #[instrument(skip(self, asset), fields(asset = %asset.name, symbol = %asset.symbol), name = "trend::score_asset")]
    pub async fn score_asset(&self, asset: &TrackedAsset) -> Result<TrendEvaluation> {
        let candles = self
            .source
            .fetch_daily(&asset.symbol)
            .await
            .with_context(|| format!("failed to fetch candles for {}", asset.symbol))?;

        let evaluation = engine::evaluate_candles(&candles);
        if let TrendEvaluation::Insufficient { available } = evaluation {
            warn!(available, required = MIN_CLOSES, "not enough history, scoring neutral");
        }
        Ok(evaluation)
    }

    /// Recompute every tracked asset and store the result as one row.
    #[instrument(skip(self), name = "trend::update")]
    pub async fn update_trends(&self) -> Result<TrendRow> {
        let timestamp = Utc::now();

        let evaluations =
            try_join_all(self.assets.iter().map(|asset| self.score_asset(asset))).await?;

        let trends: BTreeMap<String, f64> = self
            .assets
            .iter()
            .zip(evaluations.iter())
            .map(|(asset, eval)| (asset.name.clone(), eval.score()))
            .collect();

        let row = TrendRow { timestamp, trends };

        let store = self.store.clone();
        let to_store = row.clone();
        tokio::task::spawn_blocking(move || store.append(&to_store))
            .await
            .context("trend store task failed")??;

        info!(trends = ?row.trends, timestamp = %row.timestamp, "trend scores updated");
        Ok(row)
    }

    /// Most recently stored row.
    pub async fn latest(&self) -> Result<Option<TrendRow>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.latest())
            .await
            .context("trend store task failed")?
    }
}

impl std::fmt::Debug for TrendService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendService")
            .field("assets", &self.assets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn klines(closes: &[f64]) -> String {
        let rows: Vec<serde_json::Value> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let t = i as i64 * 86_400_000;
                let c = c.to_string();
                json!([t, c, c, c, c, "1000.0", t + 86_399_999, "0", 0, "0", "0", "0"])
            })
            .collect();
        serde_json::Value::Array(rows).to_string()
    }

    async fn serve(server: &mut ServerGuard, symbol: &str, body: String) -> mockito::Mock {
        server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("symbol".into(), symbol.into()),
                Matcher::UrlEncoded("interval".into(), "1d".into()),
                Matcher::UrlEncoded("limit".into(), "180".into()),
            ]))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    fn assets() -> Vec<TrackedAsset> {
        vec![
            TrackedAsset::new("bitcoin", "BTCUSDT"),
            TrackedAsset::new("ethereum", "ETHUSDT"),
            TrackedAsset::new("solana", "SOLUSDT"),
        ]
    }

    fn service(server: &ServerGuard) -> TrendService {
        let names: Vec<String> = assets().into_iter().map(|a| a.name).collect();
        let store = Arc::new(TrendStore::open_in_memory(&names).unwrap());
        let source = CandleSource::new().unwrap().with_base_url(server.url());
        TrendService::new(source, store, assets())
    }

    fn rising(n: usize) -> Vec<f64> {
        (1..=n).map(|i| i as f64).collect()
    }

    fn falling(n: usize) -> Vec<f64> {
        (1..=n).rev().map(|i| i as f64).collect()
    }

    #[tokio::test]
    async fn update_scores_and_stores_every_asset() {
        let mut server = Server::new_async().await;
        let btc = serve(&mut server, "BTCUSDT", klines(&rising(200))).await;
        let eth = serve(&mut server, "ETHUSDT", klines(&falling(200))).await;
        let sol = serve(&mut server, "SOLUSDT", klines(&rising(50))).await;

        let svc = service(&server);
        let row = svc.update_trends().await.unwrap();

        assert_eq!(row.trends["bitcoin"], 1.0);
        assert_eq!(row.trends["ethereum"], -1.0);
        // Short history is stored as a neutral score.
        assert_eq!(row.trends["solana"], 0.0);

        let latest = svc.latest().await.unwrap().unwrap();
        assert_eq!(latest.trends, row.trends);
        assert_eq!(latest.timestamp.timestamp_millis(), row.timestamp.timestamp_millis());

        btc.assert_async().await;
        eth.assert_async().await;
        sol.assert_async().await;
    }

    #[tokio::test]
    async fn every_update_refetches_candles() {
        let mut server = Server::new_async().await;
        let mut mocks = Vec::new();
        for asset in assets() {
            let mock = server
                .mock("GET", "/api/v3/klines")
                .match_query(Matcher::UrlEncoded("symbol".into(), asset.symbol.clone()))
                .with_status(200)
                .with_body(klines(&rising(180)))
                .expect(2)
                .create_async()
                .await;
            mocks.push(mock);
        }

        let svc = service(&server);
        svc.update_trends().await.unwrap();
        svc.update_trends().await.unwrap();
        for mock in mocks {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn fetch_failure_aborts_without_storing() {
        let mut server = Server::new_async().await;
        serve(&mut server, "BTCUSDT", klines(&rising(200))).await;
        serve(&mut server, "ETHUSDT", klines(&rising(200))).await;
        server
            .mock("GET", "/api/v3/klines")
            .match_query(Matcher::UrlEncoded("symbol".into(), "SOLUSDT".into()))
            .with_status(500)
            .with_body("upstream down")
            .create_async()
            .await;

        let svc = service(&server);
        let err = svc.update_trends().await.unwrap_err();
        assert!(format!("{err:#}").contains("SOLUSDT"));
        assert!(svc.latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn latest_is_none_before_first_update() {
        let server = Server::new_async().await;
        assert!(service(&server).latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn score_asset_reports_insufficient_history() {
        let mut server = Server::new_async().await;
        serve(&mut server, "BTCUSDT", klines(&rising(50))).await;

        let svc = service(&server);
        let eval = svc
            .score_asset(&TrackedAsset::new("bitcoin", "BTCUSDT"))
            .await
            .unwrap();
        assert_eq!(eval, TrendEvaluation::Insufficient { available: 50 });
    }
}
