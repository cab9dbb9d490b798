//! Built-in ticker rosters per exchange.
//!
//! Lists are ordered by market capitalisation so `top_n` keeps the largest
//! listings. Indian symbols are shared between NSE and BSE and take the
//! exchange suffix from configuration.

use stock_common::Config;
use tracing::warn;

const INDIA_LARGE_CAPS: &[&str] = &[
    "RELIANCE", "TCS", "HDFCBANK", "INFY", "HINDUNILVR",
    "ICICIBANK", "BHARTIARTL", "ITC", "SBIN", "BAJFINANCE",
    "KOTAKBANK", "LT", "ASIANPAINT", "AXISBANK", "MARUTI",
    "TITAN", "SUNPHARMA", "ULTRACEMCO", "NESTLEIND", "WIPRO",
    "HCLTECH", "TECHM", "POWERGRID", "NTPC", "TATAMOTORS",
    "M&M", "TATASTEEL", "ONGC", "ADANIENT", "ADANIPORTS",
];

const NASDAQ_LARGE_CAPS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA",
    "META", "TSLA", "AVGO", "COST", "NFLX",
    "AMD", "PEP", "ADBE", "CSCO", "CMCSA",
    "INTC", "QCOM", "TMUS", "AMGN", "HON",
    "TXN", "INTU", "AMAT", "SBUX", "ISRG",
    "BKNG", "GILD", "VRTX", "ADI", "MDLZ",
];

const NYSE_LARGE_CAPS: &[&str] = &[
    "JPM", "V", "WMT", "JNJ", "PG", "MA", "XOM",
    "BAC", "CVX", "ABBV", "KO", "PFE", "MRK", "DIS",
];

const FALLBACK_EXCHANGE: &str = "NSE";

fn roster(exchange: &str) -> Option<&'static [&'static str]> {
    match exchange {
        "NSE" | "BSE" => Some(INDIA_LARGE_CAPS),
        "NASDAQ" => Some(NASDAQ_LARGE_CAPS),
        "NYSE" => Some(NYSE_LARGE_CAPS),
        _ => None,
    }
}

/// Tickers for an exchange, optionally limited to the first `top_n`.
///
/// An unknown exchange falls back to NSE.
pub fn exchange_tickers(exchange: &str, top_n: Option<usize>, config: &Config) -> Vec<String> {
    let code = exchange.trim().to_uppercase();
    let (code, symbols) = match roster(&code) {
        Some(symbols) => (code, symbols),
        None => {
            warn!(exchange = %exchange, fallback = FALLBACK_EXCHANGE, "Unknown exchange");
            (FALLBACK_EXCHANGE.to_string(), INDIA_LARGE_CAPS)
        }
    };

    let suffix = config.exchange_suffix(&code);
    let limit = top_n.unwrap_or(symbols.len());

    symbols
        .iter()
        .take(limit)
        .map(|symbol| format!("{}{}", symbol, suffix))
        .collect()
}

/// Exchange codes with a built-in roster.
pub fn supported_exchanges() -> &'static [&'static str] {
    &["NSE", "BSE", "NASDAQ", "NYSE"]
}
