//! `stock-scanner` command line.
//!
//! Results are printed as pretty JSON on stdout; logs go to stderr.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use stock_common::error::ResultExt;
use stock_common::logging::init_logging;
use stock_common::{Config, Error};
use stock_scanner::data::universe::supported_exchanges;
use stock_scanner::screener::{CombineLogic, FilterRule, ScanRequest, TickerUniverse};
use stock_scanner::ScannerContext;

/// Cached price history, technical indicators, and rule-based stock scanning.
#[derive(Parser, Debug)]
#[command(name = "stock-scanner")]
#[command(author = "theonlyhennygod")]
#[command(version)]
#[command(about = "Scan equities against technical and fundamental rules.", long_about = None)]
struct Cli {
    /// Config file (default: ~/.stock-scanner/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan a ticker universe against filter rules
    Scan {
        /// Comma separated tickers (e.g. RELIANCE.NS,TCS.NS)
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,

        /// Exchange roster to scan when no tickers are given (NSE, BSE, NASDAQ, NYSE)
        #[arg(long, value_parser = parse_exchange)]
        exchange: Option<String>,

        /// Only scan the first N tickers of the exchange roster
        #[arg(long)]
        top_n: Option<usize>,

        /// Technical rule such as "rsi<30" (repeatable)
        #[arg(long = "rule")]
        rules: Vec<FilterRule>,

        /// Fundamental rule such as "pe<20" (repeatable)
        #[arg(long = "fundamental-rule")]
        fundamental_rules: Vec<FilterRule>,

        /// How rule outcomes combine: and, or
        #[arg(long, default_value = "and")]
        logic: CombineLogic,

        /// Ignore cached data
        #[arg(long)]
        force_refresh: bool,

        /// Read the full scan request from a JSON file instead
        #[arg(long, conflicts_with_all = ["tickers", "exchange", "top_n", "rules", "fundamental_rules"])]
        request: Option<PathBuf>,
    },

    /// Technical snapshot, fundamentals, and signals for one ticker
    Analyze {
        ticker: String,

        #[arg(long)]
        force_refresh: bool,
    },

    /// Stored fundamental snapshot history, newest first
    Fundamentals {
        ticker: String,

        /// Earliest snapshot date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Latest snapshot date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// Capture a fresh fundamental snapshot for each ticker
    Track {
        #[arg(required = true, num_args = 1..)]
        tickers: Vec<String>,
    },

    /// Inspect or maintain the local cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CacheCommands {
    /// Ticker count, record count, and date range
    Info {
        /// Freshness and metadata of one ticker instead
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Delete cached prices, indicators, and metadata
    Clear {
        /// Only this ticker (default: everything)
        #[arg(long)]
        ticker: Option<String>,
    },
    /// Delete price rows older than N days
    Cleanup {
        #[arg(long, default_value = "365")]
        days: u32,
    },
}

#[derive(Debug, Serialize)]
struct TrackReport {
    captured: Vec<String>,
    failed: Vec<String>,
}

fn parse_exchange(value: &str) -> Result<String, String> {
    let code = value.trim().to_uppercase();
    if supported_exchanges().contains(&code.as_str()) {
        Ok(code)
    } else {
        Err(format!(
            "unknown exchange '{}', expected one of {}",
            value,
            supported_exchanges().join(", ")
        ))
    }
}

fn storage(err: anyhow::Error) -> Error {
    Error::Storage(format!("{:#}", err))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_request(path: &Path) -> stock_common::Result<ScanRequest> {
    let content = std::fs::read_to_string(path)
        .context(format!("Failed to read scan request {}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let context = ScannerContext::new(config)?;

    match cli.command {
        Commands::Scan {
            tickers,
            exchange,
            top_n,
            rules,
            fundamental_rules,
            logic,
            force_refresh,
            request,
        } => {
            let request = match request {
                Some(path) => load_request(&path)?,
                None => ScanRequest {
                    universe: if tickers.is_empty() {
                        TickerUniverse::Exchange { exchange, top_n }
                    } else {
                        TickerUniverse::Tickers { tickers }
                    },
                    technical_rules: rules,
                    fundamental_rules,
                    combine_logic: logic,
                    force_refresh,
                },
            };

            let result = context.scan_engine().scan(&request).await?;
            info!("{}", result.summary());
            print_json(&result)
        }

        Commands::Analyze {
            ticker,
            force_refresh,
        } => match context.scan_engine().analyze(&ticker, force_refresh).await {
            Some(analysis) => print_json(&analysis),
            None => Err(Error::NotFound(format!("No price history for {}", ticker)).into()),
        },

        Commands::Fundamentals { ticker, start, end } => {
            // Whole days: start of `start` through the last microsecond of `end`
            let midnight = |d: NaiveDate| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN));
            let start = start.map(midnight);
            let end = end
                .and_then(|d| d.succ_opt())
                .map(|d| midnight(d) - chrono::Duration::microseconds(1));
            let history = context
                .cache
                .load_fundamental_history(&ticker, start, end)
                .await
                .map_err(storage)?;
            print_json(&history)
        }

        Commands::Track { tickers } => {
            let mut report = TrackReport {
                captured: Vec::new(),
                failed: Vec::new(),
            };
            for ticker in tickers {
                match context.fetcher.capture_fundamental_snapshot(&ticker).await {
                    Some(_) => report.captured.push(ticker),
                    None => {
                        warn!(ticker = %ticker, "No fundamentals captured");
                        report.failed.push(ticker);
                    }
                }
            }
            info!(
                captured = report.captured.len(),
                failed = report.failed.len(),
                "Fundamental tracking complete"
            );
            print_json(&report)?;
            if report.captured.is_empty() {
                return Err(Error::External(format!(
                    "No fundamentals captured for {} tickers",
                    report.failed.len()
                ))
                .into());
            }
            Ok(())
        }

        Commands::Cache { action } => match action {
            CacheCommands::Info { ticker: None } => print_json(&context.cache.info().await),
            CacheCommands::Info {
                ticker: Some(ticker),
            } => {
                let max_age_days = context.config.data_storage.cache_days;
                let freshness = context
                    .cache
                    .freshness(&ticker, max_age_days)
                    .await
                    .map_err(storage)?;
                let metadata = context.cache.metadata(&ticker).await.map_err(storage)?;
                print_json(&serde_json::json!({
                    "ticker": ticker,
                    "max_age_days": max_age_days,
                    "freshness": freshness,
                    "metadata": metadata,
                }))
            }
            CacheCommands::Clear { ticker } => {
                let removed = context
                    .cache
                    .clear(ticker.as_deref())
                    .await
                    .map_err(storage)?;
                print_json(&serde_json::json!({ "ticker": ticker, "rows_removed": removed }))
            }
            CacheCommands::Cleanup { days } => {
                let removed = context.cache.cleanup_old_data(days).await.map_err(storage)?;
                print_json(&serde_json::json!({ "days_kept": days, "rows_removed": removed }))
            }
        },
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<Error>())
        .map_or(1, |e| u8::try_from(e.exit_code()).unwrap_or(1))
}

fn is_storage_failure(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<Error>())
        .any(Error::is_storage)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load_with_env(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(exit_code(&e));
        }
    };

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    let db_path = config.data_storage.db_path.clone();

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if is_storage_failure(&e) {
                eprintln!("Cache database: {}", db_path.display());
            }
            ExitCode::from(exit_code(&e))
        }
    }
}
