//! Market data module.
//!
//! Provides the time-series cache, source adapters, and the fetch
//! orchestrator that decides between cached and fresh data.
//!
//! # Data Sources
//! - **Yahoo Finance** (default): chart history and quote summary fundamentals
//!
//! Any type implementing [`MarketDataSource`] / [`FundamentalsSource`] can be
//! plugged into the [`FetchOrchestrator`].

mod cache;
mod fetcher;
mod fundamentals;
mod provider;
mod rate_limiter;
pub mod universe;
mod yahoo;

pub use cache::{
    CacheInfo, CacheMetadata, DateRange, Freshness, SeriesStore, TimeSeriesCache,
};
pub use fetcher::{FetchOrchestrator, FetchSettings};
pub use fundamentals::{FundamentalField, FundamentalSnapshot};
pub use provider::{FundamentalsSource, InfoMap, MarketDataSource, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use yahoo::YahooFinanceClient;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Request Parameters
// ============================================================================

/// History range requested from a market data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
    #[serde(rename = "5y")]
    FiveYears,
    #[serde(rename = "10y")]
    TenYears,
    #[serde(rename = "ytd")]
    YearToDate,
    #[serde(rename = "max")]
    Max,
}

impl Period {
    /// Parse from the wire string (e.g., "1y", "6mo", "max")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "1d" => Some(Self::OneDay),
            "5d" => Some(Self::FiveDays),
            "1mo" => Some(Self::OneMonth),
            "3mo" => Some(Self::ThreeMonths),
            "6mo" => Some(Self::SixMonths),
            "1y" => Some(Self::OneYear),
            "2y" => Some(Self::TwoYears),
            "5y" => Some(Self::FiveYears),
            "10y" => Some(Self::TenYears),
            "ytd" => Some(Self::YearToDate),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// Wire string understood by the source
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::FiveDays => "5d",
            Self::OneMonth => "1mo",
            Self::ThreeMonths => "3mo",
            Self::SixMonths => "6mo",
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
            Self::FiveYears => "5y",
            Self::TenYears => "10y",
            Self::YearToDate => "ytd",
            Self::Max => "max",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bar interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "1d")]
    Daily,
    #[serde(rename = "5d")]
    FiveDays,
    #[serde(rename = "1wk")]
    Weekly,
    #[serde(rename = "1mo")]
    Monthly,
    #[serde(rename = "3mo")]
    Quarterly,
}

impl Interval {
    /// Parse from the wire string (e.g., "1d", "1wk", "60m")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Some(Self::M1),
            "5m" => Some(Self::M5),
            "15m" => Some(Self::M15),
            "30m" => Some(Self::M30),
            "1h" | "60m" => Some(Self::H1),
            "1d" | "d" | "daily" => Some(Self::Daily),
            "5d" => Some(Self::FiveDays),
            "1wk" | "w" | "weekly" => Some(Self::Weekly),
            "1mo" | "monthly" => Some(Self::Monthly),
            "3mo" => Some(Self::Quarterly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::Daily => "1d",
            Self::FiveDays => "5d",
            Self::Weekly => "1wk",
            Self::Monthly => "1mo",
            Self::Quarterly => "3mo",
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Core Data Types
// ============================================================================

/// A single daily price bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Split/dividend adjusted close, when the source provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adj_close: Option<f64>,
}

impl OhlcvRow {
    /// Whether every required price field holds a finite number
    pub fn is_complete(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// A ticker's price history in ascending timestamp order, one row per timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvSeries {
    pub ticker: String,
    pub rows: Vec<OhlcvRow>,
}

impl OhlcvSeries {
    /// Build a series, sorting by timestamp and keeping the last row for
    /// duplicated timestamps.
    pub fn new(ticker: impl Into<String>, mut rows: Vec<OhlcvRow>) -> Self {
        rows.sort_by_key(|r| r.timestamp);

        let mut unique: Vec<OhlcvRow> = Vec::with_capacity(rows.len());
        for row in rows {
            match unique.last_mut() {
                Some(last) if last.timestamp == row.timestamp => *last = row,
                _ => unique.push(row),
            }
        }

        Self {
            ticker: ticker.into(),
            rows: unique,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&OhlcvRow> {
        self.rows.first()
    }

    pub fn last(&self) -> Option<&OhlcvRow> {
        self.rows.last()
    }

    /// Latest close, used as the current price
    pub fn last_close(&self) -> Option<f64> {
        self.rows.last().map(|r| r.close)
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.open).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.low).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.volume).collect()
    }
}

/// Canonical timestamp text used by the store.
///
/// Fixed width, so lexical order equals chronological order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    /// Daily bars starting 2024-01-01 with the given closes.
    pub(crate) fn make_series(ticker: &str, closes: &[f64]) -> OhlcvSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let rows = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvRow {
                timestamp: start + Duration::days(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000.0 + i as f64,
                adj_close: Some(close),
            })
            .collect();
        OhlcvSeries::new(ticker, rows)
    }

    #[test]
    fn test_period_parse() {
        assert_eq!(Period::parse("1y"), Some(Period::OneYear));
        assert_eq!(Period::parse("6MO"), Some(Period::SixMonths));
        assert_eq!(Period::parse("max"), Some(Period::Max));
        assert_eq!(Period::parse("7y"), None);
        assert_eq!(Period::OneYear.to_string(), "1y");
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!(Interval::parse("1d"), Some(Interval::Daily));
        assert_eq!(Interval::parse("60m"), Some(Interval::H1));
        assert_eq!(Interval::parse("1wk"), Some(Interval::Weekly));
        assert_eq!(Interval::parse("2d"), None);
        assert_eq!(Interval::Weekly.as_str(), "1wk");
    }

    #[test]
    fn test_series_sorted_and_deduplicated() {
        let series = make_series("AAPL", &[1.0, 2.0, 3.0]);
        let mut rows = series.rows.clone();
        rows.reverse();
        let mut dup = rows[0].clone();
        dup.close = 99.0;
        rows.push(dup);

        let normalized = OhlcvSeries::new("AAPL", rows);
        assert_eq!(normalized.len(), 3);
        assert!(normalized
            .rows
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(normalized.last_close(), Some(99.0));
    }

    #[test]
    fn test_row_completeness() {
        let mut row = make_series("X", &[10.0]).rows[0].clone();
        assert!(row.is_complete());
        row.volume = f64::NAN;
        assert!(!row.is_complete());
    }

    #[test]
    fn test_timestamp_text_roundtrip() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 0).unwrap();
        let text = format_timestamp(&ts);
        assert_eq!(text, "2024-03-05T14:30:00.000000Z");
        assert_eq!(parse_timestamp(&text), Some(ts));
    }
}
