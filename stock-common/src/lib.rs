//! Stock Common - Shared configuration, error types, and logging for the stock scanner.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup with noise filtering

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    Config, DataFetchConfig, DataStorageConfig, ExchangeConfig, IndicatorConfig,
    MarketDataConfig, ObservabilityConfig,
};
pub use error::{Error, Result, ResultExt};
