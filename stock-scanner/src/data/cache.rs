//! Durable time-series cache backed by SQLite.
//!
//! Stores per ticker:
//! - OHLCV price history (fully replaced on every refresh)
//! - Cache metadata, the single source of truth for freshness
//! - Append-only fundamental snapshots
//! - Computed indicator rows
//!
//! Freshness is decided from `stock_metadata.last_updated` only. Individual
//! row ages are never inspected.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    format_timestamp, parse_timestamp, FundamentalField, FundamentalSnapshot, OhlcvRow,
    OhlcvSeries,
};
use crate::indicators::{IndicatorColumn, IndicatorRow, IndicatorSeries};

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Daily price bars
CREATE TABLE IF NOT EXISTS stock_prices (
    ticker TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume REAL NOT NULL,
    adj_close REAL,
    PRIMARY KEY (ticker, timestamp)
);

-- One row per ticker, rewritten together with its price rows
CREATE TABLE IF NOT EXISTS stock_metadata (
    ticker TEXT PRIMARY KEY,
    last_updated TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    first_date TEXT,
    last_date TEXT
);

-- Append-only fundamental history
CREATE TABLE IF NOT EXISTS stock_fundamentals (
    ticker TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    trailing_pe REAL,
    forward_pe REAL,
    price_to_book REAL,
    price_to_sales REAL,
    peg_ratio REAL,
    market_cap REAL,
    enterprise_value REAL,
    debt_to_equity REAL,
    current_ratio REAL,
    quick_ratio REAL,
    profit_margin REAL,
    operating_margin REAL,
    return_on_assets REAL,
    return_on_equity REAL,
    revenue_growth REAL,
    earnings_growth REAL,
    dividend_yield REAL,
    payout_ratio REAL,
    beta REAL,
    sector TEXT,
    industry TEXT,
    PRIMARY KEY (ticker, timestamp)
);

CREATE INDEX IF NOT EXISTS idx_fundamentals_ticker_ts
ON stock_fundamentals(ticker, timestamp DESC);

-- Indicator rows, one JSON object of column values per bar
CREATE TABLE IF NOT EXISTS stock_indicators (
    ticker TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    values_json TEXT NOT NULL,
    PRIMARY KEY (ticker, timestamp)
);
"#;

/// `now` minus `days`, `None` when that falls before chrono's range.
fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_signed(Duration::days(i64::from(days)))
}

// ============================================================================
// Records
// ============================================================================

/// Per-ticker refresh bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub ticker: String,
    pub last_updated: DateTime<Utc>,
    pub record_count: usize,
    pub first_date: Option<DateTime<Utc>>,
    pub last_date: Option<DateTime<Utc>>,
}

impl CacheMetadata {
    /// Whether the last full refresh is at most `max_age_days` old at `now`.
    pub fn is_fresh_at(&self, max_age_days: u32, now: DateTime<Utc>) -> bool {
        now - self.last_updated <= Duration::days(i64::from(max_age_days))
    }
}

/// Diagnostic view of a ticker's cache state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Freshness {
    /// Never fetched, or cleared
    Missing,
    Stale { last_updated: DateTime<Utc> },
    Fresh { last_updated: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateRange {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

/// Read-only overview of cache contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub ticker_count: usize,
    pub total_records: usize,
    pub date_range: Option<DateRange>,
    pub tickers: Vec<String>,
    /// Set when statistics could not be gathered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl std::fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} tickers, {} records",
            self.ticker_count, self.total_records
        )?;
        if let Some(range) = &self.date_range {
            write!(
                f,
                " ({} to {})",
                range.earliest.date_naive(),
                range.latest.date_naive()
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// Store Abstraction
// ============================================================================

/// Persistence operations the fetch pipeline depends on.
///
/// Errors mean the store itself failed; misses and stale data are `Ok(None)`.
#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Cheap check that the store is reachable
    async fn health_check(&self) -> Result<()>;

    async fn load(&self, ticker: &str, max_age_days: u32) -> Result<Option<OhlcvSeries>>;

    async fn save(&self, ticker: &str, series: &OhlcvSeries) -> Result<()>;

    async fn load_latest_fundamentals(
        &self,
        ticker: &str,
        max_age_days: u32,
    ) -> Result<Option<FundamentalSnapshot>>;

    async fn save_fundamental_snapshot(&self, snapshot: &FundamentalSnapshot) -> Result<()>;

    async fn save_indicators(&self, series: &IndicatorSeries) -> Result<()>;
}

// ============================================================================
// Time Series Cache
// ============================================================================

/// SQLite-backed cache for price history, fundamentals, and indicators.
#[derive(Clone)]
pub struct TimeSeriesCache {
    /// rusqlite::Connection is Send but not Sync, so access goes through a
    /// Mutex; each operation holds it for one statement or one transaction.
    db: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl TimeSeriesCache {
    /// Open (or create) the cache at a file path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create cache directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(&db_path)
            .with_context(|| format!("Failed to open cache database {}", db_path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        let cache = Self::init(conn, Some(db_path))?;
        info!(db_path = ?cache.db_path, "Initialized time series cache");
        Ok(cache)
    }

    /// Open a private in-memory cache.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory cache")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Database file, `None` for in-memory caches
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub async fn metadata(&self, ticker: &str) -> Result<Option<CacheMetadata>> {
        let db = self.db.lock().await;
        Self::read_metadata(&db, ticker)
    }

    fn read_metadata(db: &Connection, ticker: &str) -> Result<Option<CacheMetadata>> {
        let row = db
            .query_row(
                "SELECT ticker, last_updated, record_count, first_date, last_date
                 FROM stock_metadata WHERE ticker = ?1",
                params![ticker],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("Failed to read cache metadata for {}", ticker))?;

        let Some((ticker, last_updated, record_count, first_date, last_date)) = row else {
            return Ok(None);
        };

        let last_updated = parse_timestamp(&last_updated).with_context(|| {
            format!("Corrupt last_updated for {}: {}", ticker, last_updated)
        })?;

        Ok(Some(CacheMetadata {
            ticker,
            last_updated,
            record_count: usize::try_from(record_count).unwrap_or(0),
            first_date: first_date.as_deref().and_then(parse_timestamp),
            last_date: last_date.as_deref().and_then(parse_timestamp),
        }))
    }

    /// Distinguish "never fetched" from "fetched long ago" for diagnostics.
    pub async fn freshness(&self, ticker: &str, max_age_days: u32) -> Result<Freshness> {
        let now = Utc::now();
        Ok(match self.metadata(ticker).await? {
            None => Freshness::Missing,
            Some(meta) if meta.is_fresh_at(max_age_days, now) => Freshness::Fresh {
                last_updated: meta.last_updated,
            },
            Some(meta) => Freshness::Stale {
                last_updated: meta.last_updated,
            },
        })
    }

    // ========================================================================
    // Price History
    // ========================================================================

    /// Load a ticker's series if its last refresh is at most `max_age_days` old.
    ///
    /// A missing or stale ticker is `Ok(None)`.
    pub async fn load(&self, ticker: &str, max_age_days: u32) -> Result<Option<OhlcvSeries>> {
        self.load_as_of(ticker, max_age_days, Utc::now()).await
    }

    /// [`load`](Self::load) evaluated against an explicit clock.
    pub async fn load_as_of(
        &self,
        ticker: &str,
        max_age_days: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<OhlcvSeries>> {
        let db = self.db.lock().await;

        let Some(meta) = Self::read_metadata(&db, ticker)? else {
            debug!(ticker = %ticker, "Cache miss: no metadata");
            return Ok(None);
        };
        if !meta.is_fresh_at(max_age_days, now) {
            debug!(
                ticker = %ticker,
                last_updated = %meta.last_updated,
                max_age_days,
                "Cache miss: stale"
            );
            return Ok(None);
        }

        let mut stmt = db.prepare(
            "SELECT timestamp, open, high, low, close, volume, adj_close
             FROM stock_prices WHERE ticker = ?1 ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![ticker], Self::row_to_ohlcv)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read price rows for {}", ticker))?;

        debug!(ticker = %ticker, rows = rows.len(), "Cache hit");
        Ok(Some(OhlcvSeries {
            ticker: ticker.to_string(),
            rows,
        }))
    }

    fn row_to_ohlcv(row: &rusqlite::Row) -> rusqlite::Result<OhlcvRow> {
        let ts: String = row.get(0)?;
        let timestamp = parse_timestamp(&ts).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("invalid timestamp: {}", ts).into(),
            )
        })?;

        Ok(OhlcvRow {
            timestamp,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            close: row.get(4)?,
            volume: row.get(5)?,
            adj_close: row.get(6)?,
        })
    }

    /// Replace a ticker's price history and metadata in one transaction.
    pub async fn save(&self, ticker: &str, series: &OhlcvSeries) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction().context("Failed to begin transaction")?;

        tx.execute("DELETE FROM stock_prices WHERE ticker = ?1", params![ticker])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO stock_prices
                 (ticker, timestamp, open, high, low, close, volume, adj_close)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in &series.rows {
                stmt.execute(params![
                    ticker,
                    format_timestamp(&row.timestamp),
                    row.open,
                    row.high,
                    row.low,
                    row.close,
                    row.volume,
                    row.adj_close,
                ])?;
            }
        }

        let first = series.rows.iter().map(|r| r.timestamp).min();
        let last = series.rows.iter().map(|r| r.timestamp).max();
        tx.execute(
            "INSERT OR REPLACE INTO stock_metadata
             (ticker, last_updated, record_count, first_date, last_date)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                ticker,
                format_timestamp(&Utc::now()),
                series.rows.len() as i64,
                first.as_ref().map(format_timestamp),
                last.as_ref().map(format_timestamp),
            ],
        )?;

        tx.commit()
            .with_context(|| format!("Failed to commit price history for {}", ticker))?;

        debug!(ticker = %ticker, rows = series.rows.len(), "Saved price history");
        Ok(())
    }

    // ========================================================================
    // Fundamentals
    // ========================================================================

    /// Upsert one snapshot by `(ticker, timestamp)`; older snapshots are kept.
    pub async fn save_fundamental_snapshot(&self, snapshot: &FundamentalSnapshot) -> Result<()> {
        let columns: Vec<&str> = FundamentalField::ALL.iter().map(|f| f.name()).collect();
        let placeholders = (1..=columns.len() + 4)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT OR REPLACE INTO stock_fundamentals
             (ticker, timestamp, {}, sector, industry) VALUES ({})",
            columns.join(", "),
            placeholders
        );

        let mut values: Vec<Value> = Vec::with_capacity(columns.len() + 4);
        values.push(Value::Text(snapshot.ticker.clone()));
        values.push(Value::Text(format_timestamp(&snapshot.timestamp)));
        for field in FundamentalField::ALL {
            values.push(snapshot.get(field).map_or(Value::Null, Value::Real));
        }
        values.push(snapshot.sector.clone().map_or(Value::Null, Value::Text));
        values.push(snapshot.industry.clone().map_or(Value::Null, Value::Text));

        let db = self.db.lock().await;
        db.execute(&sql, params_from_iter(values.iter()))
            .with_context(|| format!("Failed to save fundamentals for {}", snapshot.ticker))?;

        debug!(ticker = %snapshot.ticker, timestamp = %snapshot.timestamp, "Saved fundamental snapshot");
        Ok(())
    }

    fn fundamentals_select() -> String {
        let columns: Vec<&str> = FundamentalField::ALL.iter().map(|f| f.name()).collect();
        format!(
            "SELECT ticker, timestamp, {}, sector, industry FROM stock_fundamentals",
            columns.join(", ")
        )
    }

    fn row_to_fundamentals(row: &rusqlite::Row) -> rusqlite::Result<FundamentalSnapshot> {
        let ts: String = row.get(1)?;
        let timestamp = parse_timestamp(&ts).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("invalid timestamp: {}", ts).into(),
            )
        })?;

        let mut snapshot = FundamentalSnapshot {
            ticker: row.get(0)?,
            timestamp,
            ..Default::default()
        };
        for (i, field) in FundamentalField::ALL.iter().enumerate() {
            snapshot.set(*field, row.get(i + 2)?);
        }
        let tail = FundamentalField::ALL.len() + 2;
        snapshot.sector = row.get(tail)?;
        snapshot.industry = row.get(tail + 1)?;
        Ok(snapshot)
    }

    /// Snapshot history between optional bounds, newest first.
    pub async fn load_fundamental_history(
        &self,
        ticker: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<FundamentalSnapshot>> {
        let mut sql = Self::fundamentals_select();
        sql.push_str(" WHERE ticker = ?1");

        let mut args = vec![Value::Text(ticker.to_string())];
        if let Some(start) = start {
            args.push(Value::Text(format_timestamp(&start)));
            sql.push_str(&format!(" AND timestamp >= ?{}", args.len()));
        }
        if let Some(end) = end {
            args.push(Value::Text(format_timestamp(&end)));
            sql.push_str(&format!(" AND timestamp <= ?{}", args.len()));
        }
        sql.push_str(" ORDER BY timestamp DESC");

        let db = self.db.lock().await;
        let mut stmt = db.prepare(&sql)?;
        let snapshots = stmt
            .query_map(params_from_iter(args.iter()), Self::row_to_fundamentals)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Failed to read fundamentals for {}", ticker))?;
        Ok(snapshots)
    }

    /// Newest snapshot not in the future and at most `max_age_days` old.
    pub async fn load_latest_fundamentals(
        &self,
        ticker: &str,
        max_age_days: u32,
    ) -> Result<Option<FundamentalSnapshot>> {
        let now = Utc::now();
        let latest = self
            .load_fundamental_history(ticker, days_before(now, max_age_days), Some(now))
            .await?
            .into_iter()
            .next();
        Ok(latest)
    }

    // ========================================================================
    // Indicators
    // ========================================================================

    /// Replace a ticker's stored indicator rows.
    pub async fn save_indicators(&self, series: &IndicatorSeries) -> Result<()> {
        let encoded = series
            .rows()
            .into_iter()
            .map(|row| Ok((format_timestamp(&row.timestamp), serde_json::to_string(&row.values)?)))
            .collect::<Result<Vec<_>>>()?;

        let mut db = self.db.lock().await;
        let tx = db.transaction().context("Failed to begin transaction")?;
        tx.execute(
            "DELETE FROM stock_indicators WHERE ticker = ?1",
            params![series.ticker],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO stock_indicators (ticker, timestamp, values_json) VALUES (?1, ?2, ?3)",
            )?;
            for (ts, json) in &encoded {
                stmt.execute(params![series.ticker, ts, json])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit indicators for {}", series.ticker))?;

        debug!(ticker = %series.ticker, rows = encoded.len(), "Saved indicator rows");
        Ok(())
    }

    /// Stored indicator rows, gated by the same freshness as price history.
    pub async fn load_indicators(
        &self,
        ticker: &str,
        max_age_days: u32,
    ) -> Result<Option<IndicatorSeries>> {
        let db = self.db.lock().await;

        match Self::read_metadata(&db, ticker)? {
            Some(meta) if meta.is_fresh_at(max_age_days, Utc::now()) => {}
            _ => return Ok(None),
        }

        let mut stmt = db.prepare(
            "SELECT timestamp, values_json FROM stock_indicators
             WHERE ticker = ?1 ORDER BY timestamp ASC",
        )?;
        let raw = stmt
            .query_map(params![ticker], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        if raw.is_empty() {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(raw.len());
        for (ts, json) in raw {
            let timestamp = parse_timestamp(&ts)
                .with_context(|| format!("Corrupt indicator timestamp for {}: {}", ticker, ts))?;
            let values: BTreeMap<IndicatorColumn, Option<f64>> = serde_json::from_str(&json)
                .with_context(|| format!("Corrupt indicator row for {} at {}", ticker, ts))?;
            rows.push(IndicatorRow { timestamp, values });
        }

        Ok(Some(IndicatorSeries::from_rows(ticker, rows)))
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Remove price rows, indicator rows, and metadata for one ticker or all.
    ///
    /// Fundamental history is kept. Returns the number of price rows removed.
    pub async fn clear(&self, ticker: Option<&str>) -> Result<usize> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;

        let removed = match ticker {
            Some(t) => {
                let n = tx.execute("DELETE FROM stock_prices WHERE ticker = ?1", params![t])?;
                tx.execute("DELETE FROM stock_indicators WHERE ticker = ?1", params![t])?;
                tx.execute("DELETE FROM stock_metadata WHERE ticker = ?1", params![t])?;
                n
            }
            None => {
                let n = tx.execute("DELETE FROM stock_prices", [])?;
                tx.execute("DELETE FROM stock_indicators", [])?;
                tx.execute("DELETE FROM stock_metadata", [])?;
                n
            }
        };
        tx.commit().context("Failed to clear cache")?;

        info!(ticker = ticker.unwrap_or("*"), rows = removed, "Cleared cache");
        Ok(removed)
    }

    /// Delete price rows older than `days_to_keep` and refresh the affected
    /// row counts and date bounds. Refresh times are left untouched.
    pub async fn cleanup_old_data(&self, days_to_keep: u32) -> Result<usize> {
        let Some(cutoff) = days_before(Utc::now(), days_to_keep) else {
            debug!(days_to_keep, "Cutoff predates every representable timestamp, nothing to clean");
            return Ok(0);
        };
        let cutoff = format_timestamp(&cutoff);

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM stock_prices WHERE timestamp < ?1",
            params![cutoff],
        )?;
        tx.execute(
            "DELETE FROM stock_indicators WHERE timestamp < ?1",
            params![cutoff],
        )?;
        tx.execute(
            "UPDATE stock_metadata SET
                record_count = (SELECT COUNT(*) FROM stock_prices p WHERE p.ticker = stock_metadata.ticker),
                first_date = (SELECT MIN(timestamp) FROM stock_prices p WHERE p.ticker = stock_metadata.ticker),
                last_date = (SELECT MAX(timestamp) FROM stock_prices p WHERE p.ticker = stock_metadata.ticker)",
            [],
        )?;
        tx.commit().context("Failed to clean up old data")?;

        info!(deleted, days_to_keep, "Cleaned up old price rows");
        Ok(deleted)
    }

    /// Cache overview. Never fails; problems are reported in `error`.
    pub async fn info(&self) -> CacheInfo {
        match self.try_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Failed to gather cache info");
                CacheInfo {
                    error: Some(e.to_string()),
                    ..Default::default()
                }
            }
        }
    }

    async fn try_info(&self) -> Result<CacheInfo> {
        let db = self.db.lock().await;

        let total_records: i64 =
            db.query_row("SELECT COUNT(*) FROM stock_prices", [], |row| row.get(0))?;

        let mut stmt = db.prepare("SELECT ticker FROM stock_metadata ORDER BY ticker")?;
        let tickers = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let (earliest, latest): (Option<String>, Option<String>) = db.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM stock_prices",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let date_range = match (
            earliest.as_deref().and_then(parse_timestamp),
            latest.as_deref().and_then(parse_timestamp),
        ) {
            (Some(earliest), Some(latest)) => Some(DateRange { earliest, latest }),
            _ => None,
        };

        Ok(CacheInfo {
            ticker_count: tickers.len(),
            total_records: usize::try_from(total_records).unwrap_or(0),
            date_range,
            tickers,
            error: None,
        })
    }
}

#[async_trait]
impl SeriesStore for TimeSeriesCache {
    async fn health_check(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("Cache database is unreachable")?;
        Ok(())
    }

    async fn load(&self, ticker: &str, max_age_days: u32) -> Result<Option<OhlcvSeries>> {
        TimeSeriesCache::load(self, ticker, max_age_days).await
    }

    async fn save(&self, ticker: &str, series: &OhlcvSeries) -> Result<()> {
        TimeSeriesCache::save(self, ticker, series).await
    }

    async fn load_latest_fundamentals(
        &self,
        ticker: &str,
        max_age_days: u32,
    ) -> Result<Option<FundamentalSnapshot>> {
        TimeSeriesCache::load_latest_fundamentals(self, ticker, max_age_days).await
    }

    async fn save_fundamental_snapshot(&self, snapshot: &FundamentalSnapshot) -> Result<()> {
        TimeSeriesCache::save_fundamental_snapshot(self, snapshot).await
    }

    async fn save_indicators(&self, series: &IndicatorSeries) -> Result<()> {
        TimeSeriesCache::save_indicators(self, series).await
    }
}

// ============================================================================
// Tests
// ============================================================================
