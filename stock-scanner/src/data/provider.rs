//! Source abstractions for price history and fundamentals.
//!
//! Sources return an empty result when a symbol simply has no data, and a
//! [`ProviderError`] when the request itself failed. The fetch orchestrator
//! relies on that distinction to decide what to retry.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use super::{Interval, OhlcvRow, Period};

/// Raw key/value fundamentals as returned by a source (e.g. `trailingPE`).
pub type InfoMap = HashMap<String, serde_json::Value>;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data sources.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// The symbol exists in no form the source knows about
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Source is temporarily unavailable
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed response or other source-side failure
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_suffix(retry_after_secs: &Option<u64>) -> String {
    retry_after_secs
        .map(|secs| format!(", retry after {} seconds", secs))
        .unwrap_or_default()
}

impl ProviderError {
    /// Check if the error is worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_) | Self::Internal(_)
        )
    }

    /// Check if the error means "this symbol has no data"
    pub fn is_no_data(&self) -> bool {
        matches!(self, Self::DataNotAvailable(_))
    }
}

// ============================================================================
// Source Traits
// ============================================================================

/// Source of OHLCV price history.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Source name for logging (e.g., "yahoo")
    fn name(&self) -> &'static str;

    /// Fetch bars for a ticker.
    ///
    /// Returns an empty vector when the symbol has no data for the range.
    async fn fetch_history(
        &self,
        ticker: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<OhlcvRow>, ProviderError>;
}

/// Source of point-in-time fundamental metrics.
#[async_trait]
pub trait FundamentalsSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fetch the current key/value fundamentals for a ticker.
    ///
    /// Returns an empty map when the source knows nothing about the ticker.
    async fn fetch_info(&self, ticker: &str) -> Result<InfoMap, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProviderError::Network("timeout".into()).to_string(),
            "Network error: timeout"
        );
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_secs: Some(30)
            }
            .to_string(),
            "Rate limited, retry after 30 seconds"
        );
        assert_eq!(
            ProviderError::RateLimited {
                retry_after_secs: None
            }
            .to_string(),
            "Rate limited"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(ProviderError::Network("x".into()).is_recoverable());
        assert!(ProviderError::Unavailable("x".into()).is_recoverable());
        assert!(!ProviderError::InvalidRequest("x".into()).is_recoverable());
        assert!(!ProviderError::DataNotAvailable("x".into()).is_recoverable());
        assert!(ProviderError::DataNotAvailable("x".into()).is_no_data());
    }
}
