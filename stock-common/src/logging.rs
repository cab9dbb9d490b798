//! Logging setup for the stock scanner.
//!
//! Logs always go to stderr; stdout carries command output (JSON scan
//! results) and must stay parseable.
//!
//! HTTP and TLS internals (hyper, reqwest, h2, rustls) are capped at `warn`
//! so a scan over a few hundred tickers does not drown in connection-pool
//! chatter. `RUST_LOG` overrides everything.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Crates whose debug output is transport noise.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with the enclosing `scan` span attached
    Json,
    /// Human-readable lines
    Pretty,
}

impl LogFormat {
    /// Anything other than "json" is pretty.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

fn filter_directives(log_level: &str) -> String {
    NOISY_MODULES
        .iter()
        .fold(log_level.trim().to_string(), |mut acc, module| {
            acc.push_str(&format!(",{}=warn", module));
            acc
        })
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(log_level)))
}

/// Install the global subscriber.
///
/// * `log_level` - base level (trace, debug, info, warn, error)
/// * `log_format` - "json" or "pretty"
///
/// Calling it again is a no-op.
pub fn init_logging(log_level: &str, log_format: &str) {
    let format = LogFormat::parse(log_format);
    let registry = tracing_subscriber::registry().with(build_filter(log_level));

    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .compact(),
            )
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(log_level = %log_level, format = ?format, "Logging initialized");
    }
}

/// Fresh id for the `scan` span, so one scan's log lines can be grouped.
pub fn generate_scan_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
