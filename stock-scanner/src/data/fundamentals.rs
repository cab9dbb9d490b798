//! Point-in-time fundamental metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::InfoMap;

/// Numeric fundamental metrics usable in scan rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundamentalField {
    TrailingPe,
    ForwardPe,
    PriceToBook,
    PriceToSales,
    PegRatio,
    MarketCap,
    EnterpriseValue,
    DebtToEquity,
    CurrentRatio,
    QuickRatio,
    ProfitMargin,
    OperatingMargin,
    ReturnOnAssets,
    ReturnOnEquity,
    RevenueGrowth,
    EarningsGrowth,
    DividendYield,
    PayoutRatio,
    Beta,
}

impl FundamentalField {
    pub const ALL: [FundamentalField; 19] = [
        Self::TrailingPe,
        Self::ForwardPe,
        Self::PriceToBook,
        Self::PriceToSales,
        Self::PegRatio,
        Self::MarketCap,
        Self::EnterpriseValue,
        Self::DebtToEquity,
        Self::CurrentRatio,
        Self::QuickRatio,
        Self::ProfitMargin,
        Self::OperatingMargin,
        Self::ReturnOnAssets,
        Self::ReturnOnEquity,
        Self::RevenueGrowth,
        Self::EarningsGrowth,
        Self::DividendYield,
        Self::PayoutRatio,
        Self::Beta,
    ];

    /// Snake-case name used in rules and storage
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrailingPe => "trailing_pe",
            Self::ForwardPe => "forward_pe",
            Self::PriceToBook => "price_to_book",
            Self::PriceToSales => "price_to_sales",
            Self::PegRatio => "peg_ratio",
            Self::MarketCap => "market_cap",
            Self::EnterpriseValue => "enterprise_value",
            Self::DebtToEquity => "debt_to_equity",
            Self::CurrentRatio => "current_ratio",
            Self::QuickRatio => "quick_ratio",
            Self::ProfitMargin => "profit_margin",
            Self::OperatingMargin => "operating_margin",
            Self::ReturnOnAssets => "return_on_assets",
            Self::ReturnOnEquity => "return_on_equity",
            Self::RevenueGrowth => "revenue_growth",
            Self::EarningsGrowth => "earnings_growth",
            Self::DividendYield => "dividend_yield",
            Self::PayoutRatio => "payout_ratio",
            Self::Beta => "beta",
        }
    }

    /// Key used by the upstream quote source
    pub fn source_key(&self) -> &'static str {
        match self {
            Self::TrailingPe => "trailingPE",
            Self::ForwardPe => "forwardPE",
            Self::PriceToBook => "priceToBook",
            Self::PriceToSales => "priceToSalesTrailing12Months",
            Self::PegRatio => "pegRatio",
            Self::MarketCap => "marketCap",
            Self::EnterpriseValue => "enterpriseValue",
            Self::DebtToEquity => "debtToEquity",
            Self::CurrentRatio => "currentRatio",
            Self::QuickRatio => "quickRatio",
            Self::ProfitMargin => "profitMargins",
            Self::OperatingMargin => "operatingMargins",
            Self::ReturnOnAssets => "returnOnAssets",
            Self::ReturnOnEquity => "returnOnEquity",
            Self::RevenueGrowth => "revenueGrowth",
            Self::EarningsGrowth => "earningsGrowth",
            Self::DividendYield => "dividendYield",
            Self::PayoutRatio => "payoutRatio",
            Self::Beta => "beta",
        }
    }

    /// Resolve a rule field name, including short aliases (`pe`, `pb`, `de`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase();
        let canonical = match lower.as_str() {
            "pe" => "trailing_pe",
            "pb" => "price_to_book",
            "ps" => "price_to_sales",
            "de" => "debt_to_equity",
            "roe" => "return_on_equity",
            "roa" => "return_on_assets",
            "peg" => "peg_ratio",
            other => other,
        };
        Self::ALL.iter().copied().find(|f| f.name() == canonical)
    }
}

impl std::fmt::Display for FundamentalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fundamental metrics for one ticker captured at one point in time.
///
/// Snapshots are append-only; a new capture never mutates an older one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,

    // Valuation
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub market_cap: Option<f64>,
    pub enterprise_value: Option<f64>,

    // Financial health
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    pub quick_ratio: Option<f64>,

    // Profitability
    pub profit_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub return_on_assets: Option<f64>,
    pub return_on_equity: Option<f64>,

    // Growth
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,

    // Dividends
    pub dividend_yield: Option<f64>,
    pub payout_ratio: Option<f64>,

    pub beta: Option<f64>,

    pub sector: Option<String>,
    pub industry: Option<String>,
}

impl FundamentalSnapshot {
    /// Build a snapshot from a source key/value map.
    ///
    /// Returns `None` when the map is too sparse to describe a real listing.
    pub fn from_info(ticker: &str, timestamp: DateTime<Utc>, info: &InfoMap) -> Option<Self> {
        if info.len() <= 1 {
            return None;
        }

        let mut snapshot = Self {
            ticker: ticker.to_string(),
            timestamp,
            sector: info.get("sector").and_then(|v| v.as_str()).map(String::from),
            industry: info
                .get("industry")
                .and_then(|v| v.as_str())
                .map(String::from),
            ..Default::default()
        };

        for field in FundamentalField::ALL {
            let value = info
                .get(field.source_key())
                .and_then(|v| v.as_f64())
                .filter(|v| v.is_finite());
            snapshot.set(field, value);
        }

        Some(snapshot)
    }

    /// Read a numeric metric
    pub fn get(&self, field: FundamentalField) -> Option<f64> {
        match field {
            FundamentalField::TrailingPe => self.trailing_pe,
            FundamentalField::ForwardPe => self.forward_pe,
            FundamentalField::PriceToBook => self.price_to_book,
            FundamentalField::PriceToSales => self.price_to_sales,
            FundamentalField::PegRatio => self.peg_ratio,
            FundamentalField::MarketCap => self.market_cap,
            FundamentalField::EnterpriseValue => self.enterprise_value,
            FundamentalField::DebtToEquity => self.debt_to_equity,
            FundamentalField::CurrentRatio => self.current_ratio,
            FundamentalField::QuickRatio => self.quick_ratio,
            FundamentalField::ProfitMargin => self.profit_margin,
            FundamentalField::OperatingMargin => self.operating_margin,
            FundamentalField::ReturnOnAssets => self.return_on_assets,
            FundamentalField::ReturnOnEquity => self.return_on_equity,
            FundamentalField::RevenueGrowth => self.revenue_growth,
            FundamentalField::EarningsGrowth => self.earnings_growth,
            FundamentalField::DividendYield => self.dividend_yield,
            FundamentalField::PayoutRatio => self.payout_ratio,
            FundamentalField::Beta => self.beta,
        }
    }

    pub fn set(&mut self, field: FundamentalField, value: Option<f64>) {
        let slot = match field {
            FundamentalField::TrailingPe => &mut self.trailing_pe,
            FundamentalField::ForwardPe => &mut self.forward_pe,
            FundamentalField::PriceToBook => &mut self.price_to_book,
            FundamentalField::PriceToSales => &mut self.price_to_sales,
            FundamentalField::PegRatio => &mut self.peg_ratio,
            FundamentalField::MarketCap => &mut self.market_cap,
            FundamentalField::EnterpriseValue => &mut self.enterprise_value,
            FundamentalField::DebtToEquity => &mut self.debt_to_equity,
            FundamentalField::CurrentRatio => &mut self.current_ratio,
            FundamentalField::QuickRatio => &mut self.quick_ratio,
            FundamentalField::ProfitMargin => &mut self.profit_margin,
            FundamentalField::OperatingMargin => &mut self.operating_margin,
            FundamentalField::ReturnOnAssets => &mut self.return_on_assets,
            FundamentalField::ReturnOnEquity => &mut self.return_on_equity,
            FundamentalField::RevenueGrowth => &mut self.revenue_growth,
            FundamentalField::EarningsGrowth => &mut self.earnings_growth,
            FundamentalField::DividendYield => &mut self.dividend_yield,
            FundamentalField::PayoutRatio => &mut self.payout_ratio,
            FundamentalField::Beta => &mut self.beta,
        };
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_info() -> InfoMap {
        let value = json!({
            "trailingPE": 18.5,
            "priceToBook": 3.2,
            "debtToEquity": 45.0,
            "marketCap": 2.5e12,
            "returnOnEquity": 0.21,
            "sector": "Technology",
            "industry": "Software",
            "longName": "Example Corp"
        });
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_from_info_maps_source_keys() {
        let snap = FundamentalSnapshot::from_info("EXM", Utc::now(), &sample_info()).unwrap();
        assert_eq!(snap.trailing_pe, Some(18.5));
        assert_eq!(snap.price_to_book, Some(3.2));
        assert_eq!(snap.market_cap, Some(2.5e12));
        assert_eq!(snap.sector.as_deref(), Some("Technology"));
        assert_eq!(snap.forward_pe, None);
    }

    #[test]
    fn test_from_info_sparse_map_is_no_data() {
        let info: InfoMap = serde_json::from_value(json!({"trailingPegRatio": null})).unwrap();
        assert!(FundamentalSnapshot::from_info("ZZZ", Utc::now(), &info).is_none());
        assert!(FundamentalSnapshot::from_info("ZZZ", Utc::now(), &InfoMap::new()).is_none());
    }

    #[test]
    fn test_field_aliases() {
        assert_eq!(FundamentalField::from_name("pe"), Some(FundamentalField::TrailingPe));
        assert_eq!(FundamentalField::from_name("PB"), Some(FundamentalField::PriceToBook));
        assert_eq!(FundamentalField::from_name("de"), Some(FundamentalField::DebtToEquity));
        assert_eq!(
            FundamentalField::from_name("trailing_pe"),
            Some(FundamentalField::TrailingPe)
        );
        assert_eq!(FundamentalField::from_name("rsi"), None);
    }

    #[test]
    fn test_get_set_cover_every_field() {
        let mut snap = FundamentalSnapshot::default();
        for (i, field) in FundamentalField::ALL.iter().enumerate() {
            snap.set(*field, Some(i as f64));
        }
        for (i, field) in FundamentalField::ALL.iter().enumerate() {
            assert_eq!(snap.get(*field), Some(i as f64));
        }
    }
}
