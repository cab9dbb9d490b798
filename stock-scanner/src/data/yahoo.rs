//! Yahoo Finance adapter.
//!
//! # Endpoints
//! - `/v8/finance/chart/{ticker}`: OHLCV history by range and interval
//! - `/v10/finance/quoteSummary/{ticker}`: key statistics and profile,
//!   flattened into a single key/value map
//!
//! # Coverage
//! - NSE (`.NS`) and BSE (`.BO`) listings
//! - US listings (no suffix)
//!
//! Requests are throttled proactively; a 429 still surfaces as
//! [`ProviderError::RateLimited`] so the orchestrator can back off.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use stock_common::config::MarketDataConfig;

use super::provider::{FundamentalsSource, InfoMap, MarketDataSource, ProviderError};
use super::rate_limiter::{RateLimiter, SharedRateLimiter};
use super::{Interval, OhlcvRow, Period};

// ============================================================================
// Constants
// ============================================================================

const CHART_ENDPOINT: &str = "/v8/finance/chart";

const QUOTE_SUMMARY_ENDPOINT: &str = "/v10/finance/quoteSummary";

/// quoteSummary modules that carry the fundamental fields
const SUMMARY_MODULES: &str = "summaryDetail,defaultKeyStatistics,financialData,assetProfile";

/// Suggested wait after a 429
const RATE_LIMIT_RETRY_SECS: u64 = 5;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
    description: Option<String>,
}

impl ApiError {
    fn message(&self) -> String {
        match (&self.code, &self.description) {
            (Some(code), Some(desc)) => format!("{}: {}", code, desc),
            (Some(code), None) => code.clone(),
            (None, Some(desc)) => desc.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Vec<ChartAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEnvelope {
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    result: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    error: Option<ApiError>,
}

// ============================================================================
// Parsing
// ============================================================================

fn parse_chart(ticker: &str, result: &ChartResult) -> Result<Vec<OhlcvRow>, ProviderError> {
    let quote = result.indicators.quote.first();
    let adj = result.indicators.adjclose.first();
    let pick = |v: Option<&Vec<Option<f64>>>, i: usize| v.and_then(|col| col.get(i).copied().flatten());

    let mut rows = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let timestamp = Utc.timestamp_opt(ts, 0).single().ok_or_else(|| {
            ProviderError::Internal(format!("Invalid timestamp for {}: {}", ticker, ts))
        })?;

        let (Some(open), Some(high), Some(low), Some(close)) = (
            pick(quote.map(|q| &q.open), i),
            pick(quote.map(|q| &q.high), i),
            pick(quote.map(|q| &q.low), i),
            pick(quote.map(|q| &q.close), i),
        ) else {
            // Yahoo emits null bars for halted sessions
            continue;
        };

        rows.push(OhlcvRow {
            timestamp,
            open,
            high,
            low,
            close,
            volume: pick(quote.map(|q| &q.volume), i).unwrap_or(0.0),
            adj_close: pick(adj.map(|a| &a.adjclose), i),
        });
    }

    Ok(rows)
}

/// Merge quoteSummary modules into one map.
///
/// Numeric fields arrive as `{"raw": 18.5, "fmt": "18.50"}` and are reduced
/// to their raw value; empty objects (`{}`) mean "not reported" and are dropped.
fn flatten_summary(modules: &serde_json::Map<String, serde_json::Value>) -> InfoMap {
    let mut info = InfoMap::new();
    for module in modules.values() {
        let Some(fields) = module.as_object() else {
            continue;
        };
        for (key, value) in fields {
            let flat = match value {
                serde_json::Value::Object(obj) => match obj.get("raw") {
                    Some(raw) => raw.clone(),
                    None => continue,
                },
                serde_json::Value::Null => continue,
                other => other.clone(),
            };
            info.entry(key.clone()).or_insert(flat);
        }
    }
    info
}

// ============================================================================
// Client
// ============================================================================

/// Yahoo Finance HTTP client.
pub struct YahooFinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limiter: SharedRateLimiter,
}

impl YahooFinanceClient {
    pub fn new(config: &MarketDataConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            rate_limiter: Arc::new(RateLimiter::new("yahoo", config.rate_limit_rpm)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON document, mapping transport and status failures.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        ticker: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        if !self.rate_limiter.try_acquire() {
            debug!(
                limiter = self.rate_limiter.name(),
                ticker = %ticker,
                "Rate limit reached, waiting for a token"
            );
            self.rate_limiter.acquire().await;
        }

        debug!(url = %url, ticker = %ticker, "Requesting Yahoo Finance");

        let response = self
            .client
            .get(url)
            .query(query)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network("Request timeout".into())
                } else if e.is_connect() {
                    ProviderError::Network("Connection failed".into())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ProviderError::DataNotAvailable(format!(
                "No data found for {}",
                ticker
            )));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS),
            });
        }

        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidRequest(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl MarketDataSource for YahooFinanceClient {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_history(
        &self,
        ticker: &str,
        period: Period,
        interval: Interval,
    ) -> Result<Vec<OhlcvRow>, ProviderError> {
        let url = format!("{}{}/{}", self.base_url, CHART_ENDPOINT, ticker);
        let envelope: ChartEnvelope = self
            .get_json(
                ticker,
                &url,
                &[
                    ("range", period.as_str()),
                    ("interval", interval.as_str()),
                    ("events", "div,splits"),
                ],
            )
            .await?;

        if let Some(err) = envelope.chart.error {
            return Err(ProviderError::DataNotAvailable(err.message()));
        }

        let Some(result) = envelope.chart.result.as_ref().and_then(|r| r.first()) else {
            return Ok(Vec::new());
        };

        let rows = parse_chart(ticker, result)?;
        debug!(ticker = %ticker, rows = rows.len(), "Parsed chart history");
        Ok(rows)
    }
}

#[async_trait]
impl FundamentalsSource for YahooFinanceClient {
    fn name(&self) -> &'static str {
        "yahoo"
    }

    async fn fetch_info(&self, ticker: &str) -> Result<InfoMap, ProviderError> {
        let url = format!("{}{}/{}", self.base_url, QUOTE_SUMMARY_ENDPOINT, ticker);
        let envelope: SummaryEnvelope = self
            .get_json(ticker, &url, &[("modules", SUMMARY_MODULES)])
            .await?;

        if let Some(err) = envelope.quote_summary.error {
            return Err(ProviderError::DataNotAvailable(err.message()));
        }

        Ok(envelope
            .quote_summary
            .result
            .as_ref()
            .and_then(|r| r.first())
            .map(flatten_summary)
            .unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> YahooFinanceClient {
        YahooFinanceClient::new(&MarketDataConfig {
            base_url: server.uri(),
            rate_limit_rpm: 6000,
            timeout_secs: 5,
            ..Default::default()
        })
    }

    fn chart_body() -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {"symbol": "RELIANCE.NS", "currency": "INR"},
                    "timestamp": [1704153600, 1704240000, 1704326400],
                    "indicators": {
                        "quote": [{
                            "open": [2500.0, null, 2520.0],
                            "high": [2550.0, null, 2560.0],
                            "low": [2490.0, null, 2510.0],
                            "close": [2540.0, null, 2555.0],
                            "volume": [1200000, null, 1300000]
                        }],
                        "adjclose": [{"adjclose": [2538.5, null, 2553.1]}]
                    }
                }],
                "error": null
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_history_parses_chart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/RELIANCE.NS"))
            .and(query_param("range", "1y"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body()))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let rows = client
            .fetch_history("RELIANCE.NS", Period::OneYear, Interval::Daily)
            .await
            .unwrap();

        // Null bar skipped
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, Utc.timestamp_opt(1704153600, 0).unwrap());
        assert_eq!(rows[0].close, 2540.0);
        assert_eq!(rows[0].volume, 1_200_000.0);
        assert_eq!(rows[1].adj_close, Some(2553.1));
    }

    #[tokio::test]
    async fn test_requests_wait_once_bucket_is_drained() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/RELIANCE.NS"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body()))
            .expect(3)
            .mount(&server)
            .await;

        // 120 rpm: two immediate tokens, then one every 500ms
        let client = YahooFinanceClient::new(&MarketDataConfig {
            base_url: server.uri(),
            rate_limit_rpm: 120,
            timeout_secs: 5,
            ..Default::default()
        });

        let started = std::time::Instant::now();
        for _ in 0..3 {
            let rows = client
                .fetch_history("RELIANCE.NS", Period::OneYear, Interval::Daily)
                .await
                .unwrap();
            assert_eq!(rows.len(), 2);
        }
        assert!(started.elapsed() >= std::time::Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_not_found_is_no_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/NOPE.NS"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "chart": {
                    "result": null,
                    "error": {"code": "Not Found", "description": "No data found, symbol may be delisted"}
                }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_history("NOPE.NS", Period::OneYear, Interval::Daily)
            .await
            .unwrap_err();
        assert!(err.is_no_data());
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_rate_limited_and_server_errors_are_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/BUSY"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/DOWN"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let busy = client
            .fetch_history("BUSY", Period::OneMonth, Interval::Daily)
            .await
            .unwrap_err();
        assert!(matches!(
            busy,
            ProviderError::RateLimited {
                retry_after_secs: Some(RATE_LIMIT_RETRY_SECS)
            }
        ));

        let down = client
            .fetch_history("DOWN", Period::OneMonth, Interval::Daily)
            .await
            .unwrap_err();
        assert!(matches!(down, ProviderError::Unavailable(_)));
        assert!(down.is_recoverable());
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_history() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/EMPTY"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"chart": {"result": [], "error": null}})),
            )
            .mount(&server)
            .await;

        let rows = client_for(&server)
            .fetch_history("EMPTY", Period::OneYear, Interval::Daily)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_info_flattens_modules() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quoteSummary": {
                    "result": [{
                        "summaryDetail": {
                            "trailingPE": {"raw": 29.4, "fmt": "29.40"},
                            "dividendYield": {"raw": 0.005, "fmt": "0.50%"},
                            "forwardPE": {}
                        },
                        "financialData": {
                            "debtToEquity": {"raw": 145.2, "fmt": "145.20"}
                        },
                        "assetProfile": {
                            "sector": "Technology",
                            "industry": "Consumer Electronics"
                        }
                    }],
                    "error": null
                }
            })))
            .mount(&server)
            .await;

        let info = client_for(&server).fetch_info("AAPL").await.unwrap();
        assert_eq!(info.get("trailingPE"), Some(&json!(29.4)));
        assert_eq!(info.get("debtToEquity"), Some(&json!(145.2)));
        assert_eq!(info.get("sector"), Some(&json!("Technology")));
        assert!(!info.contains_key("forwardPE"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = YahooFinanceClient::new(&MarketDataConfig {
            base_url: "http://localhost:9000/".into(),
            ..Default::default()
        });
        assert_eq!(client.base_url(), "http://localhost:9000");
    }
}
