//! Stock Scanner Library
//!
//! Point-in-time and historical analysis of equity tickers from cached price
//! history, derived technical indicators, and fundamental snapshots, plus a
//! rule-based scanner over a ticker universe.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         ScanEngine                                │
//! │   universe → fetch_many → indicators → rules → ScanResult         │
//! ├──────────────────────┬───────────────────────┬───────────────────┤
//! │  FetchOrchestrator   │   IndicatorEngine     │  Field registry   │
//! │  retry / degraded    │   SMA EMA RSI MACD    │  technical        │
//! │  bounded fan-out     │   BB ATR STOCH ADX    │  fundamental      │
//! ├──────────────────────┤   OBV returns vol     │  raw columns      │
//! │  TimeSeriesCache     │                       │                   │
//! │  (SQLite, metadata   │                       │                   │
//! │   gated freshness)   │                       │                   │
//! ├──────────────────────┤                       │                   │
//! │  Yahoo Finance       │                       │                   │
//! └──────────────────────┴───────────────────────┴───────────────────┘
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod indicators;
pub mod screener;

use anyhow::{Context, Result};
use std::sync::Arc;
use stock_common::{Config, Error};
use tracing::info;

use crate::data::{
    FetchOrchestrator, FetchSettings, FundamentalsSource, MarketDataSource, TimeSeriesCache,
    YahooFinanceClient,
};
use crate::indicators::IndicatorEngine;
use crate::screener::ScanEngine;

/// Everything a command needs, built once from configuration.
pub struct ScannerContext {
    pub config: Arc<Config>,
    pub cache: TimeSeriesCache,
    pub fetcher: FetchOrchestrator,
    pub indicators: IndicatorEngine,
}

impl ScannerContext {
    /// Open the configured cache and wire the Yahoo Finance client.
    pub fn new(config: Config) -> Result<Self> {
        let cache = TimeSeriesCache::open(&config.data_storage.db_path)
            .map_err(|e| Error::Storage(format!("{:#}", e)))
            .context("Failed to open time series cache")?;
        let yahoo = Arc::new(YahooFinanceClient::new(&config.market_data));

        info!(base_url = yahoo.base_url(), "Using Yahoo Finance market data");
        Self::with_sources(config, cache, yahoo.clone(), yahoo)
    }

    /// Build with explicit sources, e.g. for alternative providers.
    pub fn with_sources(
        config: Config,
        cache: TimeSeriesCache,
        source: Arc<dyn MarketDataSource>,
        fundamentals: Arc<dyn FundamentalsSource>,
    ) -> Result<Self> {
        let settings = FetchSettings::from_config(&config)?;
        let fetcher = FetchOrchestrator::new(Arc::new(cache.clone()), source, fundamentals, settings);
        let indicators = IndicatorEngine::new(config.technical_indicators.clone());

        Ok(Self {
            config: Arc::new(config),
            cache,
            fetcher,
            indicators,
        })
    }

    pub fn scan_engine(&self) -> ScanEngine {
        ScanEngine::new(
            self.fetcher.clone(),
            self.indicators.clone(),
            Arc::clone(&self.config),
        )
    }
}
