// =============================================================================
// Trend Store — SQLite table of per-asset scores keyed by timestamp
// =============================================================================
//
// Layout (one REAL column per tracked asset):
//
//   CREATE TABLE trend_indicator (
//       bitcoin_trend  REAL,
//       ethereum_trend REAL,
//       solana_trend   REAL,
//       timestamp      INTEGER   -- unix milliseconds, UTC
//   )
//
// The table is created lazily inside the same transaction as the insert, so a
// failed insert leaves nothing behind. Column names are built from asset
// names, which are validated as plain identifiers up front.
// =============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

const TABLE: &str = "trend_indicator";

/// One stored computation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendRow {
    pub timestamp: DateTime<Utc>,
    /// Score per asset name.
    pub trends: BTreeMap<String, f64>,
}

/// Append-only store of trend rows.
pub struct TrendStore {
    conn: Mutex<Connection>,
    assets: Vec<String>,
}

impl TrendStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, assets: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open trend database {}", path.display()))?;
        info!(path = %path.display(), "trend database opened");
        Self::with_connection(conn, assets)
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory(assets: &[String]) -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::with_connection(conn, assets)
    }

    fn with_connection(conn: Connection, assets: &[String]) -> Result<Self> {
        if assets.is_empty() {
            anyhow::bail!("at least one tracked asset is required");
        }
        for name in assets {
            validate_identifier(name)?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            assets: assets.to_vec(),
        })
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    /// Create the table if missing and insert `row`, in one transaction.
    pub fn append(&self, row: &TrendRow) -> Result<()> {
        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(self.assets.len() + 1);
        for name in &self.assets {
            let score = row
                .trends
                .get(name)
                .with_context(|| format!("row has no score for tracked asset '{name}'"))?;
            values.push(rusqlite::types::Value::Real(*score));
        }
        values.push(rusqlite::types::Value::Integer(row.timestamp.timestamp_millis()));

        let mut conn = self.conn.lock();
        let tx = conn.transaction().context("failed to begin transaction")?;
        tx.execute(&self.create_sql(), [])
            .context("failed to create trend table")?;
        tx.execute(&self.insert_sql(), params_from_iter(values.iter()))
            .context("failed to insert trend row")?;
        tx.commit().context("failed to commit trend row")?;

        debug!(timestamp = %row.timestamp, "trend row stored");
        Ok(())
    }

    /// Most recent row by timestamp, or `None` when nothing was stored yet.
    pub fn latest(&self) -> Result<Option<TrendRow>> {
        let conn = self.conn.lock();

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [TABLE],
                |row| row.get(0),
            )
            .context("failed to inspect schema")?;
        if !exists {
            return Ok(None);
        }

        let n = self.assets.len();
        let row = conn
            .query_row(&self.latest_sql(), [], |row| {
                let mut scores = Vec::with_capacity(n);
                for i in 0..n {
                    scores.push(row.get::<_, f64>(i)?);
                }
                let ts: i64 = row.get(n)?;
                Ok((scores, ts))
            })
            .optional()
            .context("failed to read latest trend row")?;

        let Some((scores, ts)) = row else {
            return Ok(None);
        };

        let timestamp = Utc
            .timestamp_millis_opt(ts)
            .single()
            .with_context(|| format!("stored timestamp {ts} is out of range"))?;
        let trends = self.assets.iter().cloned().zip(scores).collect();

        Ok(Some(TrendRow { timestamp, trends }))
    }

    fn columns(&self) -> Vec<String> {
        self.assets.iter().map(|a| format!("{a}_trend")).collect()
    }

    fn create_sql(&self) -> String {
        let cols: Vec<String> = self.columns().iter().map(|c| format!("{c} REAL")).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {TABLE} ({}, timestamp INTEGER NOT NULL)",
            cols.join(", ")
        )
    }

    fn insert_sql(&self) -> String {
        let cols = self.columns();
        let placeholders: Vec<String> = (1..=cols.len() + 1).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {TABLE} ({}, timestamp) VALUES ({})",
            cols.join(", "),
            placeholders.join(", ")
        )
    }

    fn latest_sql(&self) -> String {
        format!(
            "SELECT {}, timestamp FROM {TABLE} ORDER BY timestamp DESC LIMIT 1",
            self.columns().join(", ")
        )
    }
}

impl std::fmt::Debug for TrendStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendStore")
            .field("assets", &self.assets)
            .finish()
    }
}

/// Asset names become column names: lowercase ASCII letter first, then
/// letters, digits or underscores.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        anyhow::bail!("invalid asset name '{name}': use [a-z][a-z0-9_]*");
    }
    Ok(())
}
