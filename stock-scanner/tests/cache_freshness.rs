//! Integration tests for the SQLite time-series cache.
//!
//! Covers freshness boundaries, round trips through a file-backed store,
//! and full replacement on save.

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use stock_scanner::data::{Freshness, OhlcvRow, OhlcvSeries, TimeSeriesCache};

// ============================================================================
// Helpers
// ============================================================================

fn series(ticker: &str, closes: &[f64]) -> OhlcvSeries {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let rows = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvRow {
            timestamp: start + Duration::days(i as i64),
            open: close - 0.5,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10_000.0 + i as f64,
            adj_close: Some(close),
        })
        .collect();
    OhlcvSeries::new(ticker, rows)
}

fn open_cache() -> (TempDir, TimeSeriesCache) {
    let dir = TempDir::new().unwrap();
    let cache = TimeSeriesCache::open(dir.path().join("cache").join("stocks.db")).unwrap();
    (dir, cache)
}

// ============================================================================
// Freshness
// ============================================================================

#[tokio::test]
async fn test_freshness_boundary_is_inclusive() {
    let (_dir, cache) = open_cache();
    cache.save("RELIANCE.NS", &series("RELIANCE.NS", &[1.0, 2.0, 3.0])).await.unwrap();

    let meta = cache.metadata("RELIANCE.NS").await.unwrap().unwrap();
    let at_limit = meta.last_updated + Duration::days(2);
    let past_limit = at_limit + Duration::seconds(1);

    let hit = cache.load_as_of("RELIANCE.NS", 2, at_limit).await.unwrap();
    assert_eq!(hit.map(|s| s.len()), Some(3));

    let miss = cache.load_as_of("RELIANCE.NS", 2, past_limit).await.unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn test_zero_day_window_only_accepts_same_instant() {
    let (_dir, cache) = open_cache();
    cache.save("TCS.NS", &series("TCS.NS", &[5.0])).await.unwrap();
    let meta = cache.metadata("TCS.NS").await.unwrap().unwrap();

    assert!(cache
        .load_as_of("TCS.NS", 0, meta.last_updated)
        .await
        .unwrap()
        .is_some());
    assert!(cache
        .load_as_of("TCS.NS", 0, meta.last_updated + Duration::milliseconds(1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_never_fetched_differs_from_stale() {
    let (_dir, cache) = open_cache();
    assert_eq!(cache.freshness("INFY.NS", 1).await.unwrap(), Freshness::Missing);
    assert!(cache.load("INFY.NS", 365).await.unwrap().is_none());

    cache.save("INFY.NS", &series("INFY.NS", &[10.0, 11.0])).await.unwrap();
    assert!(matches!(
        cache.freshness("INFY.NS", 1).await.unwrap(),
        Freshness::Fresh { .. }
    ));
}

// ============================================================================
// Round Trip / Replacement
// ============================================================================

#[tokio::test]
async fn test_round_trip_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stocks.db");
    let original = series("HDFCBANK.NS", &[100.0, 101.5, 99.25, 102.0]);

    {
        let cache = TimeSeriesCache::open(&path).unwrap();
        cache.save("HDFCBANK.NS", &original).await.unwrap();
    }

    let cache = TimeSeriesCache::open(&path).unwrap();
    let loaded = cache.load("HDFCBANK.NS", 1).await.unwrap().unwrap();
    assert_eq!(loaded, original);

    let meta = cache.metadata("HDFCBANK.NS").await.unwrap().unwrap();
    assert_eq!(meta.record_count, 4);
    assert_eq!(meta.first_date, original.first().map(|r| r.timestamp));
    assert_eq!(meta.last_date, original.last().map(|r| r.timestamp));
}

#[tokio::test]
async fn test_save_replaces_previous_history() {
    let (_dir, cache) = open_cache();
    cache
        .save("ITC.NS", &series("ITC.NS", &[1.0, 2.0, 3.0, 4.0, 5.0]))
        .await
        .unwrap();
    cache.save("ITC.NS", &series("ITC.NS", &[9.0, 8.0])).await.unwrap();

    let loaded = cache.load("ITC.NS", 1).await.unwrap().unwrap();
    assert_eq!(loaded.closes(), vec![9.0, 8.0]);
    assert_eq!(cache.metadata("ITC.NS").await.unwrap().unwrap().record_count, 2);
}

#[tokio::test]
async fn test_tickers_are_isolated() {
    let (_dir, cache) = open_cache();
    cache.save("A.NS", &series("A.NS", &[1.0, 2.0])).await.unwrap();
    cache.save("B.NS", &series("B.NS", &[3.0])).await.unwrap();

    cache.clear(Some("A.NS")).await.unwrap();
    assert!(cache.load("A.NS", 1).await.unwrap().is_none());
    assert_eq!(cache.load("B.NS", 1).await.unwrap().unwrap().len(), 1);

    let info = cache.info().await;
    assert_eq!(info.ticker_count, 1);
    assert_eq!(info.total_records, 1);
    assert!(info.error.is_none());
}
