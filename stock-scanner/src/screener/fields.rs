//! Typed registry of rule fields.
//!
//! A rule's field name is resolved once, in this order:
//! 1. technical indicator field (`rsi`, `sma_50`, `macd_histogram`)
//! 2. fundamental field, including aliases (`trailing_pe`, `pe`, `de`)
//! 3. raw column of the last bar, by column name (`Close`, `MACD_hist`)
//!
//! Anything else is [`Field::Unknown`], which never yields a value.

use std::fmt;

use crate::data::{FundamentalField, FundamentalSnapshot, OhlcvSeries};
use crate::indicators::{IndicatorColumn, IndicatorSeries, TechnicalSnapshot};

/// Price columns of the last bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceColumn {
    Open,
    High,
    Low,
    Close,
    AdjClose,
    Volume,
}

impl PriceColumn {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "open" => Some(Self::Open),
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "close" => Some(Self::Close),
            "adj_close" | "adj close" | "adjclose" => Some(Self::AdjClose),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawColumn {
    Price(PriceColumn),
    Indicator(IndicatorColumn),
}

/// A resolved rule field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Technical(IndicatorColumn),
    Fundamental(FundamentalField),
    Raw(RawColumn),
    Unknown(String),
}

/// Records a field value can be read from. Any of them may be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldSources<'a> {
    pub technical: Option<&'a TechnicalSnapshot>,
    pub fundamental: Option<&'a FundamentalSnapshot>,
    pub indicators: Option<&'a IndicatorSeries>,
    pub prices: Option<&'a OhlcvSeries>,
}

impl Field {
    pub fn resolve(name: &str) -> Self {
        let lower = name.trim().to_lowercase();

        if let Some(col) = IndicatorColumn::from_field_name(&lower) {
            return Self::Technical(col);
        }
        if let Some(field) = FundamentalField::from_name(&lower) {
            return Self::Fundamental(field);
        }
        if let Some(col) = PriceColumn::parse(&lower) {
            return Self::Raw(RawColumn::Price(col));
        }
        if let Some(col) = IndicatorColumn::parse(&lower) {
            return Self::Raw(RawColumn::Indicator(col));
        }

        Self::Unknown(name.to_string())
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Current value of the field, `None` when missing or undefined.
    pub fn value(&self, sources: &FieldSources<'_>) -> Option<f64> {
        match self {
            Self::Technical(col) => match sources.technical {
                Some(snapshot) => snapshot.get(*col),
                None => sources.indicators.and_then(|s| s.last_value(*col)),
            },
            Self::Fundamental(field) => sources.fundamental.and_then(|f| f.get(*field)),
            Self::Raw(RawColumn::Indicator(col)) => {
                sources.indicators.and_then(|s| s.last_value(*col))
            }
            Self::Raw(RawColumn::Price(col)) => {
                let bar = sources.prices?.last()?;
                match col {
                    PriceColumn::Open => Some(bar.open),
                    PriceColumn::High => Some(bar.high),
                    PriceColumn::Low => Some(bar.low),
                    PriceColumn::Close => Some(bar.close),
                    PriceColumn::AdjClose => bar.adj_close,
                    PriceColumn::Volume => Some(bar.volume),
                }
            }
            Self::Unknown(_) => None,
        }
        .filter(|v| v.is_finite())
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Technical(col) => write!(f, "{}", col.field_name()),
            Self::Fundamental(field) => write!(f, "{}", field),
            Self::Raw(RawColumn::Indicator(col)) => write!(f, "{}", col),
            Self::Raw(RawColumn::Price(col)) => write!(f, "{:?}", col),
            Self::Unknown(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::make_series;
    use crate::indicators::IndicatorEngine;
    use chrono::Utc;

    #[test]
    fn test_resolution_order() {
        assert_eq!(Field::resolve("rsi"), Field::Technical(IndicatorColumn::Rsi));
        assert_eq!(Field::resolve("SMA_50"), Field::Technical(IndicatorColumn::Sma(50)));
        assert_eq!(
            Field::resolve("pe"),
            Field::Fundamental(FundamentalField::TrailingPe)
        );
        assert_eq!(
            Field::resolve("Close"),
            Field::Raw(RawColumn::Price(PriceColumn::Close))
        );
        assert_eq!(
            Field::resolve("MACD_hist"),
            Field::Raw(RawColumn::Indicator(IndicatorColumn::MacdHistogram))
        );
        assert_eq!(
            Field::resolve("moon_phase"),
            Field::Unknown("moon_phase".into())
        );
        assert!(!Field::resolve("moon_phase").is_known());
    }

    #[test]
    fn test_values_from_sources() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let prices = make_series("VAL", &closes);
        let indicators = IndicatorEngine::default().compute(&prices).unwrap();
        let technical = indicators.latest().unwrap();
        let fundamental = FundamentalSnapshot {
            ticker: "VAL".into(),
            timestamp: Utc::now(),
            debt_to_equity: Some(0.4),
            ..Default::default()
        };
        let sources = FieldSources {
            technical: Some(&technical),
            fundamental: Some(&fundamental),
            indicators: Some(&indicators),
            prices: Some(&prices),
        };

        assert_eq!(Field::resolve("close").value(&sources), Some(129.0));
        assert_eq!(Field::resolve("de").value(&sources), Some(0.4));
        assert_eq!(Field::resolve("trailing_pe").value(&sources), None);
        // Warm-up not reached on 30 bars
        assert_eq!(Field::resolve("sma_200").value(&sources), None);
        assert!(Field::resolve("sma_20").value(&sources).is_some());
        assert_eq!(Field::resolve("unknown").value(&sources), None);
    }

    #[test]
    fn test_technical_falls_back_to_indicator_series() {
        let prices = make_series("FB", &[10.0; 20]);
        let indicators = IndicatorEngine::default().compute(&prices).unwrap();
        let sources = FieldSources {
            indicators: Some(&indicators),
            ..Default::default()
        };
        assert_eq!(Field::resolve("sma_20").value(&sources), Some(10.0));
        assert_eq!(Field::resolve("close").value(&sources), None);
    }
}
