//! Scan engine.
//!
//! Runs a [`ScanRequest`] over a ticker universe: batch fetch, indicator
//! computation, lazy fundamentals, then rule evaluation per ticker.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use stock_common::logging::generate_scan_id;
use stock_common::{Config, Error};

use crate::data::{universe, FetchOrchestrator, FundamentalSnapshot, OhlcvSeries};
use crate::indicators::signals::{self, Signal};
use crate::indicators::{IndicatorEngine, TechnicalSnapshot};

use super::fields::{Field, FieldSources};
use super::rule::{CombineLogic, FilterRule};

// ============================================================================
// Request / Result
// ============================================================================

/// Which tickers a scan covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TickerUniverse {
    /// Explicit ticker list
    Tickers { tickers: Vec<String> },
    /// Exchange roster; the configured default exchange when unset
    Exchange {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exchange: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top_n: Option<usize>,
    },
}

impl Default for TickerUniverse {
    fn default() -> Self {
        Self::Exchange {
            exchange: None,
            top_n: None,
        }
    }
}

/// A declarative scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(flatten)]
    pub universe: TickerUniverse,

    #[serde(default, alias = "technical_filters")]
    pub technical_rules: Vec<FilterRule>,

    #[serde(default, alias = "fundamental_filters")]
    pub fundamental_rules: Vec<FilterRule>,

    #[serde(default, alias = "filter_logic")]
    pub combine_logic: CombineLogic,

    /// Bypass cached prices and fundamentals
    #[serde(default)]
    pub force_refresh: bool,
}

impl ScanRequest {
    pub fn for_tickers<I, S>(tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            universe: TickerUniverse::Tickers {
                tickers: tickers.into_iter().map(Into::into).collect(),
            },
            ..Default::default()
        }
    }

    pub fn for_exchange(exchange: impl Into<String>, top_n: Option<usize>) -> Self {
        Self {
            universe: TickerUniverse::Exchange {
                exchange: Some(exchange.into()),
                top_n,
            },
            ..Default::default()
        }
    }

    pub fn rule_count(&self) -> usize {
        self.technical_rules.len() + self.fundamental_rules.len()
    }
}

/// A ticker that satisfied the scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMatch {
    pub ticker: String,
    pub technical: Option<TechnicalSnapshot>,
    pub fundamental: Option<FundamentalSnapshot>,
    pub current_price: Option<f64>,
    /// Descriptions of the rules that held, e.g. `Technical: rsi < 30`
    pub matched_rules: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub timestamp: DateTime<Utc>,
    /// Tickers for which price history was obtained
    pub tickers_scanned: usize,
    pub tickers_matched: usize,
    pub matches: Vec<ScanMatch>,
    pub duration_seconds: f64,
}

impl ScanResult {
    pub fn tickers(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.ticker.as_str()).collect()
    }

    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {} tickers in {:.1}s: {} matched ({:.1}%)",
            self.tickers_scanned,
            self.duration_seconds,
            self.tickers_matched,
            if self.tickers_scanned > 0 {
                (self.tickers_matched as f64 / self.tickers_scanned as f64) * 100.0
            } else {
                0.0
            }
        )
    }
}

/// Single-ticker analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAnalysis {
    pub ticker: String,
    pub technical: Option<TechnicalSnapshot>,
    pub fundamental: Option<FundamentalSnapshot>,
    pub current_price: Option<f64>,
    pub signals: Vec<Signal>,
}

// ============================================================================
// Rule Evaluation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Technical,
    Fundamental,
}

impl RuleKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Technical => "Technical",
            Self::Fundamental => "Fundamental",
        }
    }
}

/// A rule with its field resolved up front.
struct ResolvedRule<'a> {
    kind: RuleKind,
    rule: &'a FilterRule,
    field: Field,
}

impl ResolvedRule<'_> {
    /// Missing or undefined values never match.
    fn matches(&self, sources: &FieldSources<'_>) -> bool {
        self.field
            .value(sources)
            .is_some_and(|v| self.rule.operator.evaluate(v, self.rule.threshold))
    }

    fn describe(&self) -> String {
        format!("{}: {}", self.kind.label(), self.rule)
    }
}

fn resolve_rules(request: &ScanRequest) -> Vec<ResolvedRule<'_>> {
    let technical = request
        .technical_rules
        .iter()
        .map(|rule| (RuleKind::Technical, rule));
    let fundamental = request
        .fundamental_rules
        .iter()
        .map(|rule| (RuleKind::Fundamental, rule));

    technical
        .chain(fundamental)
        .map(|(kind, rule)| {
            let field = Field::resolve(&rule.field);
            if !field.is_known() {
                warn!(field = %rule.field, "Unknown rule field, rule will never match");
            }
            ResolvedRule { kind, rule, field }
        })
        .collect()
}

// ============================================================================
// Scan Engine
// ============================================================================

/// Stateless scan runner; each call owns its data for the call's duration.
#[derive(Clone)]
pub struct ScanEngine {
    fetcher: FetchOrchestrator,
    indicators: IndicatorEngine,
    config: Arc<Config>,
}

impl ScanEngine {
    pub fn new(fetcher: FetchOrchestrator, indicators: IndicatorEngine, config: Arc<Config>) -> Self {
        Self {
            fetcher,
            indicators,
            config,
        }
    }

    /// Tickers a request covers, duplicates removed, order kept.
    pub fn resolve_universe(&self, request: &ScanRequest) -> Vec<String> {
        let tickers = match &request.universe {
            TickerUniverse::Tickers { tickers } if !tickers.is_empty() => tickers
                .iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            TickerUniverse::Tickers { .. } => {
                universe::exchange_tickers(&self.config.default_exchange, None, &self.config)
            }
            TickerUniverse::Exchange { exchange, top_n } => universe::exchange_tickers(
                exchange.as_deref().unwrap_or(&self.config.default_exchange),
                *top_n,
                &self.config,
            ),
        };

        let mut seen = std::collections::HashSet::new();
        tickers
            .into_iter()
            .filter(|t: &String| seen.insert(t.clone()))
            .collect()
    }

    /// Run a scan.
    ///
    /// Per-ticker failures only exclude that ticker; an unreachable store
    /// fails the whole scan.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanResult> {
        let scan_id = generate_scan_id();
        let span = info_span!("scan", scan_id = %scan_id);
        self.run_scan(request).instrument(span).await
    }

    async fn run_scan(&self, request: &ScanRequest) -> Result<ScanResult> {
        let started = Instant::now();

        if let Err(e) = self.fetcher.store().health_check().await {
            return Err(Error::Storage(format!("{:#}", e))).context("Cache store is unreachable");
        }

        let tickers = self.resolve_universe(request);
        let rules = resolve_rules(request);
        info!(
            tickers = tickers.len(),
            technical_rules = request.technical_rules.len(),
            fundamental_rules = request.fundamental_rules.len(),
            logic = ?request.combine_logic,
            "Starting scan"
        );

        let settings = self.fetcher.settings();
        let fetched = self
            .fetcher
            .fetch_many(
                &tickers,
                settings.period,
                settings.interval,
                request.force_refresh,
                settings.max_workers,
            )
            .await;

        let mut matches = Vec::new();
        for ticker in &tickers {
            let Some(series) = fetched.get(ticker) else {
                continue;
            };
            if let Some(found) = self.evaluate_ticker(ticker, series, request, &rules).await {
                matches.push(found);
            }
        }

        let result = ScanResult {
            timestamp: Utc::now(),
            tickers_scanned: fetched.len(),
            tickers_matched: matches.len(),
            matches,
            duration_seconds: started.elapsed().as_secs_f64(),
        };

        info!(
            scanned = result.tickers_scanned,
            matched = result.tickers_matched,
            duration = format!("{:.2}s", result.duration_seconds),
            "Scan complete"
        );
        Ok(result)
    }

    async fn evaluate_ticker(
        &self,
        ticker: &str,
        series: &OhlcvSeries,
        request: &ScanRequest,
        rules: &[ResolvedRule<'_>],
    ) -> Option<ScanMatch> {
        let Some(indicators) = self.indicators.compute(series) else {
            warn!(ticker = %ticker, "Indicator computation failed, excluding ticker");
            return None;
        };
        let technical = indicators.latest();

        let fundamental = if request.fundamental_rules.is_empty() {
            None
        } else {
            self.fetcher
                .fetch_fundamentals(ticker, request.force_refresh)
                .await
        };

        let technical_sources = FieldSources {
            technical: technical.as_ref(),
            fundamental: None,
            indicators: Some(&indicators),
            prices: Some(series),
        };
        let fundamental_sources = FieldSources {
            technical: None,
            fundamental: fundamental.as_ref(),
            indicators: Some(&indicators),
            prices: Some(series),
        };

        let mut outcomes = Vec::with_capacity(rules.len());
        let mut matched_rules = Vec::new();
        for rule in rules {
            let sources = match rule.kind {
                RuleKind::Technical => &technical_sources,
                RuleKind::Fundamental => &fundamental_sources,
            };
            let matched = rule.matches(sources);
            if matched {
                matched_rules.push(rule.describe());
            }
            outcomes.push(matched);
        }

        if !request.combine_logic.combine(&outcomes) {
            debug!(ticker = %ticker, "No match");
            return None;
        }

        Some(ScanMatch {
            ticker: ticker.to_string(),
            technical,
            fundamental,
            current_price: series.last_close(),
            matched_rules,
        })
    }

    /// Full analysis of one ticker, `None` when no price history exists.
    pub async fn analyze(&self, ticker: &str, force_refresh: bool) -> Option<StockAnalysis> {
        let settings = self.fetcher.settings();
        let series = self
            .fetcher
            .fetch_one(ticker, settings.period, settings.interval, force_refresh)
            .await?;

        let indicators = self.indicators.compute(&series);
        if let Some(indicators) = &indicators {
            if self.config.data_storage.store_indicators {
                if let Err(e) = self.fetcher.store().save_indicators(indicators).await {
                    warn!(ticker = %ticker, error = %e, "Failed to persist indicators");
                }
            }
        }

        let fundamental = self.fetcher.fetch_fundamentals(ticker, force_refresh).await;

        Some(StockAnalysis {
            ticker: ticker.to_string(),
            technical: indicators.as_ref().and_then(|s| s.latest()),
            fundamental,
            current_price: series.last_close(),
            signals: indicators.as_ref().map(signals::detect).unwrap_or_default(),
        })
    }
}
