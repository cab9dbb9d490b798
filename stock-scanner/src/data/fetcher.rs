//! Cache-or-fetch orchestration with retries and degraded mode.
//!
//! Per ticker the flow is strictly ordered: cache check, source fetch with a
//! fixed retry delay, persist, then re-read. Persistence problems never cost
//! the caller the data that was just fetched.

use anyhow::{anyhow, Result};
use chrono::{SubsecRound, Utc};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use stock_common::Config;

use super::cache::SeriesStore;
use super::fundamentals::FundamentalSnapshot;
use super::provider::{FundamentalsSource, MarketDataSource, ProviderError};
use super::{Interval, OhlcvSeries, Period};

/// Knobs for cache freshness, retries, and batch concurrency.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Max age of cached price history
    pub cache_days: u32,
    pub fundamentals_max_age_days: u32,
    /// Attempts per ticker, including the first
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Worker pool size for [`FetchOrchestrator::fetch_many`]
    pub max_workers: usize,
    pub period: Period,
    pub interval: Interval,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            cache_days: 1,
            fundamentals_max_age_days: 30,
            retry_attempts: 3,
            retry_delay: Duration::from_secs(2),
            max_workers: 10,
            period: Period::OneYear,
            interval: Interval::Daily,
        }
    }
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetch = &config.data_fetch;
        let period = Period::parse(&fetch.period)
            .ok_or_else(|| anyhow!("Unknown data_fetch.period: {}", fetch.period))?;
        let interval = Interval::parse(&fetch.interval)
            .ok_or_else(|| anyhow!("Unknown data_fetch.interval: {}", fetch.interval))?;

        Ok(Self {
            cache_days: config.data_storage.cache_days,
            fundamentals_max_age_days: config.data_storage.fundamentals_max_age_days,
            retry_attempts: fetch.retry_attempts.max(1),
            retry_delay: Duration::from_secs(fetch.retry_delay_secs),
            max_workers: fetch.max_workers.max(1),
            period,
            interval,
        })
    }
}

/// Decides between cached and fresh data for one or many tickers.
#[derive(Clone)]
pub struct FetchOrchestrator {
    store: Arc<dyn SeriesStore>,
    source: Arc<dyn MarketDataSource>,
    fundamentals: Arc<dyn FundamentalsSource>,
    settings: FetchSettings,
}

impl FetchOrchestrator {
    pub fn new(
        store: Arc<dyn SeriesStore>,
        source: Arc<dyn MarketDataSource>,
        fundamentals: Arc<dyn FundamentalsSource>,
        settings: FetchSettings,
    ) -> Self {
        Self {
            store,
            source,
            fundamentals,
            settings,
        }
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn SeriesStore> {
        &self.store
    }

    /// Run `op` until it succeeds, reports no data, or attempts run out.
    ///
    /// `None` means "no data for this ticker", whatever the reason.
    async fn with_retry<T, F, Fut>(&self, ticker: &str, what: &str, mut op: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let attempts = self.settings.retry_attempts.max(1);

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Some(value),
                Err(e) if e.is_no_data() => {
                    debug!(ticker = %ticker, what, error = %e, "Source has no data");
                    return None;
                }
                Err(e) if !e.is_recoverable() => {
                    warn!(ticker = %ticker, what, error = %e, "Request rejected, not retrying");
                    return None;
                }
                Err(e) => {
                    warn!(
                        ticker = %ticker,
                        what,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Fetch attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        warn!(ticker = %ticker, what, attempts, "Giving up after retries");
        None
    }

    /// Price history for one ticker, from cache when fresh.
    pub async fn fetch_one(
        &self,
        ticker: &str,
        period: Period,
        interval: Interval,
        force_refresh: bool,
    ) -> Option<OhlcvSeries> {
        if !force_refresh {
            match self.store.load(ticker, self.settings.cache_days).await {
                Ok(Some(series)) => {
                    debug!(ticker = %ticker, rows = series.len(), "Using cached history");
                    return Some(series);
                }
                Ok(None) => {}
                Err(e) => warn!(ticker = %ticker, error = %e, "Cache read failed, fetching"),
            }
        }

        let started = Instant::now();
        let rows = self
            .with_retry(ticker, "history", || {
                self.source.fetch_history(ticker, period, interval)
            })
            .await?;

        if rows.is_empty() {
            debug!(ticker = %ticker, source = self.source.name(), "Empty history");
            return None;
        }

        let series = OhlcvSeries::new(ticker, rows);
        debug!(
            ticker = %ticker,
            rows = series.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched history"
        );

        match self.store.save(ticker, &series).await {
            Ok(()) => match self.store.load(ticker, u32::MAX).await {
                Ok(Some(canonical)) => return Some(canonical),
                Ok(None) => {
                    warn!(ticker = %ticker, "Saved history not readable, using fetched data")
                }
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Re-read failed, using fetched data")
                }
            },
            Err(e) => warn!(ticker = %ticker, error = %e, "Persist failed, using fetched data"),
        }

        Some(series)
    }

    /// Fetch many tickers on a bounded worker pool.
    ///
    /// Tickers without data are omitted. Returns after every task finished.
    pub async fn fetch_many(
        &self,
        tickers: &[String],
        period: Period,
        interval: Interval,
        force_refresh: bool,
        max_concurrency: usize,
    ) -> HashMap<String, OhlcvSeries> {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
        let mut seen = HashSet::new();
        let mut tasks = JoinSet::new();

        for ticker in tickers {
            if !seen.insert(ticker.as_str()) {
                continue;
            }

            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let ticker = ticker.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                this.fetch_one(&ticker, period, interval, force_refresh)
                    .await
                    .map(|series| (ticker, series))
            });
        }

        let mut results = HashMap::with_capacity(seen.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some((ticker, series))) => {
                    results.insert(ticker, series);
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Fetch task aborted"),
            }
        }

        info!(
            requested = seen.len(),
            fetched = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch fetch complete"
        );
        results
    }

    /// Latest fundamentals, from cache when recent enough.
    pub async fn fetch_fundamentals(
        &self,
        ticker: &str,
        force_refresh: bool,
    ) -> Option<FundamentalSnapshot> {
        if !force_refresh {
            match self
                .store
                .load_latest_fundamentals(ticker, self.settings.fundamentals_max_age_days)
                .await
            {
                Ok(Some(snapshot)) => {
                    debug!(ticker = %ticker, timestamp = %snapshot.timestamp, "Using cached fundamentals");
                    return Some(snapshot);
                }
                Ok(None) => {}
                Err(e) => warn!(ticker = %ticker, error = %e, "Fundamentals read failed, fetching"),
            }
        }

        self.capture_fundamental_snapshot(ticker).await
    }

    /// Fetch fundamentals now and append them to the history.
    pub async fn capture_fundamental_snapshot(&self, ticker: &str) -> Option<FundamentalSnapshot> {
        let info = self
            .with_retry(ticker, "fundamentals", || self.fundamentals.fetch_info(ticker))
            .await?;

        // Stored timestamps carry microseconds
        let now = Utc::now().trunc_subsecs(6);
        let Some(snapshot) = FundamentalSnapshot::from_info(ticker, now, &info) else {
            debug!(ticker = %ticker, keys = info.len(), "Fundamentals too sparse");
            return None;
        };

        if let Err(e) = self.store.save_fundamental_snapshot(&snapshot).await {
            warn!(ticker = %ticker, error = %e, "Persist failed, using fetched fundamentals");
        }

        Some(snapshot)
    }
}

// ============================================================================
// Tests
// ============================================================================
