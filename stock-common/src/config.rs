//! Configuration management for the stock scanner.
//!
//! The scanner reads a single configuration file at `~/.stock-scanner/config.json`.
//! Every field has a default, so a missing file or a partial file is valid.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (STOCK_SCANNER_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `STOCK_SCANNER_LOG_LEVEL` → observability.log_level
//! - `STOCK_SCANNER_LOG_FORMAT` → observability.log_format
//! - `STOCK_SCANNER_DB_PATH` → data_storage.db_path
//! - `STOCK_SCANNER_CACHE_DAYS` → data_storage.cache_days
//! - `STOCK_SCANNER_MAX_WORKERS` → data_fetch.max_workers
//! - `STOCK_SCANNER_BASE_URL` → market_data.base_url

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".stock-scanner"),
        |dirs| dirs.home_dir().join(".stock-scanner"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Storage
// ============================================================================

/// Time-series cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataStorageConfig {
    /// SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Maximum age in days before cached price history is refetched
    #[serde(default = "default_cache_days")]
    pub cache_days: u32,

    /// Maximum age in days of a fundamental snapshot still usable for scans
    #[serde(default = "default_fundamentals_max_age_days")]
    pub fundamentals_max_age_days: u32,

    /// Persist computed indicator rows after single-ticker analysis
    #[serde(default = "default_true")]
    pub store_indicators: bool,
}

impl Default for DataStorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_days: default_cache_days(),
            fundamentals_max_age_days: default_fundamentals_max_age_days(),
            store_indicators: true,
        }
    }
}

fn default_db_path() -> PathBuf {
    config_dir().join("stock_data.db")
}

fn default_cache_days() -> u32 {
    1
}

fn default_fundamentals_max_age_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Fetching
// ============================================================================

/// Market data acquisition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFetchConfig {
    /// History range requested from the source (1mo, 1y, 5y, max, ...)
    #[serde(default = "default_period")]
    pub period: String,

    /// Bar interval (1d, 1wk, ...)
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Worker pool size for batch fetches
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Attempts per ticker before giving up
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for DataFetchConfig {
    fn default() -> Self {
        Self {
            period: default_period(),
            interval: default_interval(),
            max_workers: default_max_workers(),
            retry_attempts: default_retry_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_period() -> String {
    "1y".into()
}

fn default_interval() -> String {
    "1d".into()
}

fn default_max_workers() -> usize {
    10
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    2
}

// ============================================================================
// Indicators
// ============================================================================

/// Window lengths for the indicator pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_sma_periods")]
    pub sma_periods: Vec<usize>,
    #[serde(default = "default_ema_periods")]
    pub ema_periods: Vec<usize>,
    #[serde(default = "default_fourteen")]
    pub rsi_period: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_twenty")]
    pub bbands_period: usize,
    #[serde(default = "default_bbands_std")]
    pub bbands_std: f64,
    #[serde(default = "default_fourteen")]
    pub atr_period: usize,
    #[serde(default = "default_fourteen")]
    pub stoch_k: usize,
    #[serde(default = "default_three")]
    pub stoch_d: usize,
    #[serde(default = "default_three")]
    pub stoch_smooth: usize,
    #[serde(default = "default_fourteen")]
    pub adx_period: usize,
    #[serde(default = "default_twenty")]
    pub volume_sma_period: usize,
    #[serde(default = "default_twenty")]
    pub volatility_window: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_periods: default_sma_periods(),
            ema_periods: default_ema_periods(),
            rsi_period: 14,
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bbands_period: 20,
            bbands_std: default_bbands_std(),
            atr_period: 14,
            stoch_k: 14,
            stoch_d: 3,
            stoch_smooth: 3,
            adx_period: 14,
            volume_sma_period: 20,
            volatility_window: 20,
        }
    }
}

fn default_sma_periods() -> Vec<usize> {
    vec![20, 50, 100, 200]
}

fn default_ema_periods() -> Vec<usize> {
    vec![12, 26, 50, 200]
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bbands_std() -> f64 {
    2.0
}

fn default_three() -> usize {
    3
}

fn default_fourteen() -> usize {
    14
}

fn default_twenty() -> usize {
    20
}

// ============================================================================
// Market Data Source
// ============================================================================

/// HTTP market data source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Proactive request throttle
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            rate_limit_rpm: default_rate_limit_rpm(),
        }
    }
}

fn default_base_url() -> String {
    "https://query1.finance.yahoo.com".into()
}

fn default_user_agent() -> String {
    format!("stock-scanner/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_rate_limit_rpm() -> u32 {
    120
}

// ============================================================================
// Exchanges
// ============================================================================

/// Ticker conventions for one exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Suffix appended to bare symbols (".NS" for NSE)
    #[serde(default)]
    pub suffix: String,

    #[serde(default)]
    pub description: String,
}

impl ExchangeConfig {
    fn new(suffix: &str, description: &str) -> Self {
        Self {
            suffix: suffix.into(),
            description: description.into(),
        }
    }
}

fn default_exchanges() -> BTreeMap<String, ExchangeConfig> {
    BTreeMap::from([
        (
            "NSE".to_string(),
            ExchangeConfig::new(".NS", "National Stock Exchange of India"),
        ),
        ("BSE".to_string(), ExchangeConfig::new(".BO", "Bombay Stock Exchange")),
        ("NASDAQ".to_string(), ExchangeConfig::new("", "NASDAQ Stock Market")),
        ("NYSE".to_string(), ExchangeConfig::new("", "New York Stock Exchange")),
    ])
}

fn default_exchange() -> String {
    "NSE".into()
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Cache configuration
    #[serde(default)]
    pub data_storage: DataStorageConfig,

    /// Fetch and retry configuration
    #[serde(default)]
    pub data_fetch: DataFetchConfig,

    /// Indicator window lengths
    #[serde(default)]
    pub technical_indicators: IndicatorConfig,

    /// Market data source
    #[serde(default)]
    pub market_data: MarketDataConfig,

    /// Known exchanges keyed by code
    #[serde(default = "default_exchanges")]
    pub exchanges: BTreeMap<String, ExchangeConfig>,

    /// Exchange used when a scan names no tickers
    #[serde(default = "default_exchange")]
    pub default_exchange: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            observability: ObservabilityConfig::default(),
            data_storage: DataStorageConfig::default(),
            data_fetch: DataFetchConfig::default(),
            technical_indicators: IndicatorConfig::default(),
            market_data: MarketDataConfig::default(),
            exchanges: default_exchanges(),
            default_exchange: default_exchange(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(e.to_string()))
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides, then validate.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("STOCK_SCANNER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("STOCK_SCANNER_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(path) = lookup("STOCK_SCANNER_DB_PATH") {
            self.data_storage.db_path = PathBuf::from(path);
        }
        if let Some(days) = lookup("STOCK_SCANNER_CACHE_DAYS") {
            match days.parse() {
                Ok(d) => self.data_storage.cache_days = d,
                Err(_) => tracing::warn!(value = %days, "Ignoring invalid STOCK_SCANNER_CACHE_DAYS"),
            }
        }
        if let Some(workers) = lookup("STOCK_SCANNER_MAX_WORKERS") {
            match workers.parse() {
                Ok(w) => self.data_fetch.max_workers = w,
                Err(_) => {
                    tracing::warn!(value = %workers, "Ignoring invalid STOCK_SCANNER_MAX_WORKERS")
                }
            }
        }
        if let Some(url) = lookup("STOCK_SCANNER_BASE_URL") {
            self.market_data.base_url = url;
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.data_fetch.max_workers == 0 {
            return Err(Error::Config("data_fetch.max_workers must be at least 1".into()));
        }
        if self.data_fetch.retry_attempts == 0 {
            return Err(Error::Config(
                "data_fetch.retry_attempts must be at least 1".into(),
            ));
        }

        let ind = &self.technical_indicators;
        if ind.sma_periods.is_empty() || ind.ema_periods.is_empty() {
            return Err(Error::Config(
                "technical_indicators needs at least one SMA and one EMA period".into(),
            ));
        }

        let windows = [
            ("rsi_period", ind.rsi_period),
            ("macd_signal", ind.macd_signal),
            ("bbands_period", ind.bbands_period),
            ("atr_period", ind.atr_period),
            ("stoch_k", ind.stoch_k),
            ("stoch_d", ind.stoch_d),
            ("stoch_smooth", ind.stoch_smooth),
            ("adx_period", ind.adx_period),
            ("volume_sma_period", ind.volume_sma_period),
            ("volatility_window", ind.volatility_window),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, w)| *w == 0) {
            return Err(Error::Config(format!(
                "technical_indicators.{} must be at least 1",
                name
            )));
        }
        if ind.sma_periods.contains(&0) || ind.ema_periods.contains(&0) {
            return Err(Error::Config("moving average periods must be at least 1".into()));
        }
        if ind.macd_fast == 0 || ind.macd_fast >= ind.macd_slow {
            return Err(Error::Config(format!(
                "macd_fast ({}) must be positive and below macd_slow ({})",
                ind.macd_fast, ind.macd_slow
            )));
        }

        Ok(())
    }

    /// Ticker suffix for an exchange code, empty when unknown.
    pub fn exchange_suffix(&self, exchange: &str) -> &str {
        self.exchanges
            .get(&exchange.to_uppercase())
            .map_or("", |e| e.suffix.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data_storage.cache_days, 1);
        assert_eq!(config.data_storage.fundamentals_max_age_days, 30);
        assert_eq!(config.data_fetch.max_workers, 10);
        assert_eq!(config.data_fetch.retry_attempts, 3);
        assert_eq!(config.data_fetch.retry_delay_secs, 2);
        assert_eq!(config.technical_indicators.sma_periods, vec![20, 50, 100, 200]);
        assert_eq!(config.default_exchange, "NSE");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"data_fetch": {"max_workers": 4}, "technical_indicators": {"rsi_period": 9}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.data_fetch.max_workers, 4);
        assert_eq!(config.data_fetch.period, "1y");
        assert_eq!(config.technical_indicators.rsi_period, 9);
        assert_eq!(config.technical_indicators.macd_slow, 26);
        assert_eq!(config.exchange_suffix("nse"), ".NS");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data_fetch.period, config.data_fetch.period);
        assert_eq!(parsed.exchanges, config.exchanges);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"data_storage": {"cache_days": 7}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.data_storage.cache_days, 7);
    }

    #[test]
    fn test_load_from_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
        assert!(err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<Error>())
            .any(Error::is_config));
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STOCK_SCANNER_LOG_LEVEL", "debug"),
            ("STOCK_SCANNER_DB_PATH", "/tmp/x.db"),
            ("STOCK_SCANNER_CACHE_DAYS", "5"),
            ("STOCK_SCANNER_MAX_WORKERS", "not-a-number"),
        ]);

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.data_storage.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.data_storage.cache_days, 5);
        assert_eq!(config.data_fetch.max_workers, 10);
    }

    #[test]
    fn test_validate_rejects_bad_windows() {
        let mut config = Config::default();
        config.data_fetch.max_workers = 0;
        assert!(config.validate().unwrap_err().is_config());

        let mut config = Config::default();
        config.technical_indicators.macd_fast = 30;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.technical_indicators.sma_periods = vec![20, 0];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.technical_indicators.atr_period = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("atr_period"));
    }
}
