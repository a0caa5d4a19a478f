// =============================================================================
// Configuration — environment variables with defaults
// =============================================================================
//
// `.env` is loaded first (see `main`), then:
//
//   SUPERNOVA_BIND_ADDR        HTTP listen address      (0.0.0.0:8000)
//   SUPERNOVA_DB_PATH          SQLite file              (supernova.db)
//   SUPERNOVA_MARKET_DATA_URL  klines endpoint base     (https://api.binance.com)
//   SUPERNOVA_ASSETS           name:SYMBOL list         (bitcoin:BTCUSDT,...)
//   INDODAX_API_KEY            private API key          (unset = no client)
//   INDODAX_API_SECRET         private API secret
//   INDODAX_API_URL            private API endpoint     (https://indodax.com/tapi)
//
// Unset or empty variables fall back to defaults; a malformed asset list is an
// error.
// =============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::exchange::client::DEFAULT_BASE_URL as DEFAULT_EXCHANGE_URL;
use crate::market_data::candle_source::DEFAULT_BASE_URL as DEFAULT_MARKET_DATA_URL;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_DB_PATH: &str = "supernova.db";

/// An asset whose trend is tracked: storage name and market symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAsset {
    /// Lowercase name, also used as the storage column prefix.
    pub name: String,
    /// Market-data symbol, e.g. `BTCUSDT`.
    pub symbol: String,
}

impl TrackedAsset {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

fn default_assets() -> Vec<TrackedAsset> {
    vec![
        TrackedAsset::new("bitcoin", "BTCUSDT"),
        TrackedAsset::new("ethereum", "ETHUSDT"),
        TrackedAsset::new("solana", "SOLUSDT"),
    ]
}

/// Private API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ExchangeCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
}

impl std::fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Process configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub market_data_url: String,
    pub assets: Vec<TrackedAsset>,
    /// `None` when no API key is configured.
    pub exchange: Option<ExchangeCredentials>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            market_data_url: DEFAULT_MARKET_DATA_URL.to_string(),
            assets: default_assets(),
            exchange: None,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, treating empty values as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let assets = match get("SUPERNOVA_ASSETS") {
            Some(raw) => parse_assets(&raw).context("invalid SUPERNOVA_ASSETS")?,
            None => defaults.assets,
        };

        let exchange = get("INDODAX_API_KEY").map(|api_key| ExchangeCredentials {
            api_key,
            api_secret: get("INDODAX_API_SECRET").unwrap_or_default(),
            base_url: get("INDODAX_API_URL").unwrap_or_else(|| DEFAULT_EXCHANGE_URL.to_string()),
        });

        Ok(Self {
            bind_addr: get("SUPERNOVA_BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_path: get("SUPERNOVA_DB_PATH").unwrap_or(defaults.db_path),
            market_data_url: get("SUPERNOVA_MARKET_DATA_URL").unwrap_or(defaults.market_data_url),
            assets,
            exchange,
        })
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.name.clone()).collect()
    }
}

/// Parse `name:SYMBOL,name:SYMBOL`. Names are lowercased, symbols uppercased.
pub fn parse_assets(raw: &str) -> Result<Vec<TrackedAsset>> {
    let mut assets: Vec<TrackedAsset> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, symbol) = entry
            .split_once(':')
            .with_context(|| format!("expected name:SYMBOL, got '{entry}'"))?;
        let name = name.trim().to_lowercase();
        let symbol = symbol.trim().to_uppercase();
        if name.is_empty() || symbol.is_empty() {
            anyhow::bail!("empty name or symbol in '{entry}'");
        }
        if assets.iter().any(|a| a.name == name) {
            anyhow::bail!("duplicate asset name '{name}'");
        }
        assets.push(TrackedAsset { name, symbol });
    }
    if assets.is_empty() {
        anyhow::bail!("no assets listed");
    }
    Ok(assets)
}
