// =============================================================================
// Supernova — Main Entry Point
// =============================================================================
//
// Loads configuration, opens the trend store and serves the trend API until
// Ctrl+C. The exchange client is only probed when credentials are configured;
// it is not part of the trend pipeline.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use supernova::api::{self, ApiState};
use supernova::config::{AppConfig, ExchangeCredentials};
use supernova::exchange::ExchangeClient;
use supernova::market_data::CandleSource;
use supernova::storage::TrendStore;
use supernova::trend::TrendService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    info!(
        assets = ?config.assets,
        db_path = %config.db_path,
        market_data_url = %config.market_data_url,
        "Supernova starting"
    );

    // ── 2. Trend pipeline ────────────────────────────────────────────────
    let store = Arc::new(TrendStore::open(&config.db_path, &config.asset_names())?);
    let source = CandleSource::new()?.with_base_url(config.market_data_url.clone());
    let trends = TrendService::new(source, store, config.assets.clone());

    // ── 3. Exchange connectivity probe ───────────────────────────────────
    match &config.exchange {
        Some(creds) => probe_exchange(creds).await,
        None => info!("no exchange credentials configured, private API client disabled"),
    }

    // ── 4. API server ────────────────────────────────────────────────────
    let app = api::router(Arc::new(ApiState { trends }));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    info!("Supernova shut down complete.");
    Ok(())
}

/// One `getInfo` call to confirm the key works. Failures are logged only.
async fn probe_exchange(creds: &ExchangeCredentials) {
    let client = match ExchangeClient::new(creds.api_key.clone(), creds.api_secret.clone()) {
        Ok(c) => c.with_base_url(creds.base_url.clone()),
        Err(e) => {
            warn!(error = %e, "failed to build exchange client");
            return;
        }
    };

    match client.get_info().await {
        Ok(info) => info!(
            user_id = %info.user_id,
            server_time = info.server_time,
            "exchange credentials verified"
        ),
        Err(e) => warn!(error = %e, "exchange credential check failed"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    warn!("Shutdown signal received — stopping gracefully");
}
