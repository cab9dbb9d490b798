//! Technical indicator pipeline.
//!
//! [`IndicatorEngine::compute`] turns an OHLCV series into a parallel
//! [`IndicatorSeries`] with one row per bar. Window lengths come from
//! [`IndicatorConfig`].

pub mod math;
pub mod signals;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use stock_common::IndicatorConfig;
use tracing::debug;

use crate::data::OhlcvSeries;

// ============================================================================
// Columns
// ============================================================================

/// Identifier of one computed indicator column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndicatorColumn {
    Sma(usize),
    Ema(usize),
    Rsi,
    Macd,
    MacdSignal,
    MacdHistogram,
    BbUpper,
    BbMiddle,
    BbLower,
    Atr,
    StochK,
    StochD,
    Adx,
    DiPlus,
    DiMinus,
    Obv,
    VolumeSma(usize),
    DailyReturn,
    CumulativeReturn,
    Volatility(usize),
}

impl IndicatorColumn {
    /// Snake-case field name (`sma_20`, `macd_signal`, `volatility_20d`)
    pub fn field_name(&self) -> String {
        match self {
            Self::Sma(n) => format!("sma_{}", n),
            Self::Ema(n) => format!("ema_{}", n),
            Self::Rsi => "rsi".into(),
            Self::Macd => "macd".into(),
            Self::MacdSignal => "macd_signal".into(),
            Self::MacdHistogram => "macd_histogram".into(),
            Self::BbUpper => "bb_upper".into(),
            Self::BbMiddle => "bb_middle".into(),
            Self::BbLower => "bb_lower".into(),
            Self::Atr => "atr".into(),
            Self::StochK => "stoch_k".into(),
            Self::StochD => "stoch_d".into(),
            Self::Adx => "adx".into(),
            Self::DiPlus => "di_plus".into(),
            Self::DiMinus => "di_minus".into(),
            Self::Obv => "obv".into(),
            Self::VolumeSma(n) => format!("volume_sma_{}", n),
            Self::DailyReturn => "daily_return".into(),
            Self::CumulativeReturn => "cumulative_return".into(),
            Self::Volatility(n) => format!("volatility_{}d", n),
        }
    }

    /// Exact snake-case field name lookup.
    pub fn from_field_name(name: &str) -> Option<Self> {
        let col = match name {
            "rsi" => Self::Rsi,
            "macd" => Self::Macd,
            "macd_signal" => Self::MacdSignal,
            "macd_histogram" => Self::MacdHistogram,
            "bb_upper" => Self::BbUpper,
            "bb_middle" => Self::BbMiddle,
            "bb_lower" => Self::BbLower,
            "atr" => Self::Atr,
            "stoch_k" => Self::StochK,
            "stoch_d" => Self::StochD,
            "adx" => Self::Adx,
            "di_plus" => Self::DiPlus,
            "di_minus" => Self::DiMinus,
            "obv" => Self::Obv,
            "daily_return" => Self::DailyReturn,
            "cumulative_return" => Self::CumulativeReturn,
            other => {
                if let Some(n) = other.strip_prefix("volume_sma_") {
                    Self::VolumeSma(n.parse().ok()?)
                } else if let Some(n) = other.strip_prefix("sma_") {
                    Self::Sma(n.parse().ok()?)
                } else if let Some(n) = other.strip_prefix("ema_") {
                    Self::Ema(n.parse().ok()?)
                } else if let Some(n) = other
                    .strip_prefix("volatility_")
                    .and_then(|rest| rest.strip_suffix('d'))
                {
                    Self::Volatility(n.parse().ok()?)
                } else {
                    return None;
                }
            }
        };
        Some(col)
    }

    /// Case-insensitive lookup by column name (`SMA_20`, `MACD_hist`,
    /// `Volatility_20d`) or field name.
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_lowercase().replace(' ', "_");
        let canonical = match lower.as_str() {
            "macd_hist" => "macd_histogram",
            "plus_di" | "di+" => "di_plus",
            "minus_di" | "di-" => "di_minus",
            other => other,
        };
        Self::from_field_name(canonical)
    }
}

/// Column names as they appear in tabular output.
impl std::fmt::Display for IndicatorColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sma(n) => write!(f, "SMA_{}", n),
            Self::Ema(n) => write!(f, "EMA_{}", n),
            Self::Rsi => write!(f, "RSI"),
            Self::Macd => write!(f, "MACD"),
            Self::MacdSignal => write!(f, "MACD_signal"),
            Self::MacdHistogram => write!(f, "MACD_hist"),
            Self::BbUpper => write!(f, "BB_upper"),
            Self::BbMiddle => write!(f, "BB_middle"),
            Self::BbLower => write!(f, "BB_lower"),
            Self::Atr => write!(f, "ATR"),
            Self::StochK => write!(f, "STOCH_K"),
            Self::StochD => write!(f, "STOCH_D"),
            Self::Adx => write!(f, "ADX"),
            Self::DiPlus => write!(f, "DI_plus"),
            Self::DiMinus => write!(f, "DI_minus"),
            Self::Obv => write!(f, "OBV"),
            Self::VolumeSma(n) => write!(f, "Volume_SMA_{}", n),
            Self::DailyReturn => write!(f, "Daily_Return"),
            Self::CumulativeReturn => write!(f, "Cumulative_Return"),
            Self::Volatility(n) => write!(f, "Volatility_{}d", n),
        }
    }
}

impl Serialize for IndicatorColumn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.field_name())
    }
}

impl<'de> Deserialize<'de> for IndicatorColumn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown indicator column: {}", name)))
    }
}

// ============================================================================
// Series
// ============================================================================

/// One bar's indicator values; `None` marks a value inside its warm-up window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<IndicatorColumn, Option<f64>>,
}

/// Columnar indicator output aligned with the source OHLCV timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub ticker: String,
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<IndicatorColumn, Vec<Option<f64>>>,
}

impl IndicatorSeries {
    pub fn new(ticker: impl Into<String>, timestamps: Vec<DateTime<Utc>>) -> Self {
        Self {
            ticker: ticker.into(),
            timestamps,
            columns: BTreeMap::new(),
        }
    }

    /// Rebuild a columnar series from stored rows.
    pub fn from_rows(ticker: impl Into<String>, rows: Vec<IndicatorRow>) -> Self {
        let timestamps: Vec<DateTime<Utc>> = rows.iter().map(|r| r.timestamp).collect();
        let mut columns: BTreeMap<IndicatorColumn, Vec<Option<f64>>> = BTreeMap::new();

        for (i, row) in rows.iter().enumerate() {
            for (col, value) in &row.values {
                columns.entry(*col).or_insert_with(|| vec![None; rows.len()])[i] = *value;
            }
        }

        Self {
            ticker: ticker.into(),
            timestamps,
            columns,
        }
    }

    /// Add a column. Values must be aligned with the timestamps.
    fn insert(&mut self, column: IndicatorColumn, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.timestamps.len());
        self.columns.insert(column, values);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn column_names(&self) -> impl Iterator<Item = &IndicatorColumn> {
        self.columns.keys()
    }

    pub fn column(&self, column: IndicatorColumn) -> Option<&[Option<f64>]> {
        self.columns.get(&column).map(Vec::as_slice)
    }

    /// Value at a row index, `None` when out of range, unknown, or undefined
    pub fn value(&self, column: IndicatorColumn, index: usize) -> Option<f64> {
        self.columns.get(&column)?.get(index).copied().flatten()
    }

    /// Value on the final bar
    pub fn last_value(&self, column: IndicatorColumn) -> Option<f64> {
        self.value(column, self.len().checked_sub(1)?)
    }

    pub fn row(&self, index: usize) -> Option<IndicatorRow> {
        let timestamp = *self.timestamps.get(index)?;
        let values = self
            .columns
            .iter()
            .map(|(col, values)| (*col, values[index]))
            .collect();
        Some(IndicatorRow { timestamp, values })
    }

    pub fn rows(&self) -> Vec<IndicatorRow> {
        (0..self.len()).filter_map(|i| self.row(i)).collect()
    }

    /// Snapshot of the last row carrying at least one defined value.
    pub fn latest(&self) -> Option<TechnicalSnapshot> {
        (0..self.len()).rev().find_map(|i| {
            let indicators: BTreeMap<IndicatorColumn, f64> = self
                .columns
                .iter()
                .filter_map(|(col, values)| values[i].map(|v| (*col, v)))
                .collect();

            (!indicators.is_empty()).then(|| TechnicalSnapshot {
                ticker: self.ticker.clone(),
                timestamp: self.timestamps[i],
                indicators,
            })
        })
    }
}

/// Defined indicator values for one ticker at one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub indicators: BTreeMap<IndicatorColumn, f64>,
}

impl TechnicalSnapshot {
    pub fn get(&self, column: IndicatorColumn) -> Option<f64> {
        self.indicators.get(&column).copied()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Stateless OHLCV to indicator transformation.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Compute every configured indicator.
    ///
    /// Returns `None` for an empty series or one with undefined price or
    /// volume values; partial output is never produced.
    pub fn compute(&self, series: &OhlcvSeries) -> Option<IndicatorSeries> {
        if series.is_empty() {
            debug!(ticker = %series.ticker, "Empty series, no indicators");
            return None;
        }
        if let Some(bad) = series.rows.iter().find(|r| !r.is_complete()) {
            debug!(
                ticker = %series.ticker,
                timestamp = %bad.timestamp,
                "Series has undefined price fields, no indicators"
            );
            return None;
        }

        let cfg = &self.config;
        let highs = series.highs();
        let lows = series.lows();
        let closes = series.closes();
        let volumes = series.volumes();

        let mut out = IndicatorSeries::new(series.ticker.clone(), series.timestamps());

        for &period in &cfg.sma_periods {
            out.insert(IndicatorColumn::Sma(period), math::sma(&closes, period));
        }
        for &period in &cfg.ema_periods {
            out.insert(IndicatorColumn::Ema(period), math::ema(&closes, period));
        }

        out.insert(IndicatorColumn::Rsi, math::rsi(&closes, cfg.rsi_period));

        let macd = math::macd(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal);
        out.insert(IndicatorColumn::Macd, macd.macd);
        out.insert(IndicatorColumn::MacdSignal, macd.signal);
        out.insert(IndicatorColumn::MacdHistogram, macd.histogram);

        let bands = math::bollinger(&closes, cfg.bbands_period, cfg.bbands_std);
        out.insert(IndicatorColumn::BbUpper, bands.upper);
        out.insert(IndicatorColumn::BbMiddle, bands.middle);
        out.insert(IndicatorColumn::BbLower, bands.lower);

        out.insert(
            IndicatorColumn::Atr,
            math::atr(&highs, &lows, &closes, cfg.atr_period),
        );

        let stoch = math::stochastic(
            &highs,
            &lows,
            &closes,
            cfg.stoch_k,
            cfg.stoch_smooth,
            cfg.stoch_d,
        );
        out.insert(IndicatorColumn::StochK, stoch.k);
        out.insert(IndicatorColumn::StochD, stoch.d);

        let adx = math::adx(&highs, &lows, &closes, cfg.adx_period);
        out.insert(IndicatorColumn::Adx, adx.adx);
        out.insert(IndicatorColumn::DiPlus, adx.di_plus);
        out.insert(IndicatorColumn::DiMinus, adx.di_minus);

        out.insert(IndicatorColumn::Obv, math::obv(&closes, &volumes));
        out.insert(
            IndicatorColumn::VolumeSma(cfg.volume_sma_period),
            math::sma(&volumes, cfg.volume_sma_period),
        );

        let daily = math::daily_returns(&closes);
        out.insert(
            IndicatorColumn::CumulativeReturn,
            math::cumulative_returns(&daily),
        );
        out.insert(
            IndicatorColumn::Volatility(cfg.volatility_window),
            math::rolling_sample_std(&daily, cfg.volatility_window),
        );
        out.insert(IndicatorColumn::DailyReturn, daily);

        debug!(
            ticker = %series.ticker,
            rows = out.len(),
            columns = out.columns.len(),
            "Computed indicators"
        );
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::make_series;

    fn trending_closes(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + i as f64 * 0.3 + (i as f64 * 0.9).sin() * 2.0)
            .collect()
    }

    #[test]
    fn test_column_names() {
        assert_eq!(IndicatorColumn::Sma(200).to_string(), "SMA_200");
        assert_eq!(IndicatorColumn::Sma(200).field_name(), "sma_200");
        assert_eq!(IndicatorColumn::Volatility(20).field_name(), "volatility_20d");
        assert_eq!(IndicatorColumn::parse("SMA_50"), Some(IndicatorColumn::Sma(50)));
        assert_eq!(IndicatorColumn::parse("MACD_hist"), Some(IndicatorColumn::MacdHistogram));
        assert_eq!(
            IndicatorColumn::parse("Volume_SMA_20"),
            Some(IndicatorColumn::VolumeSma(20))
        );
        assert_eq!(
            IndicatorColumn::parse("Volatility_20d"),
            Some(IndicatorColumn::Volatility(20))
        );
        assert_eq!(IndicatorColumn::parse("sma_x"), None);
        assert_eq!(IndicatorColumn::from_field_name("RSI"), None);
    }

    #[test]
    fn test_sma_200_warm_up_on_250_rows() {
        let series = make_series("WARM", &trending_closes(250));
        let out = IndicatorEngine::default().compute(&series).unwrap();

        assert_eq!(out.len(), 250);
        let sma = out.column(IndicatorColumn::Sma(200)).unwrap();
        assert!(sma[..199].iter().all(Option::is_none));
        assert!(sma[199..].iter().all(Option::is_some));
    }

    #[test]
    fn test_returns_end_to_end() {
        let series = make_series("E2E", &[100.0, 102.0, 101.0, 105.0, 103.0]);
        let out = IndicatorEngine::default().compute(&series).unwrap();

        let daily = out.column(IndicatorColumn::DailyReturn).unwrap();
        assert_eq!(daily[0], None);
        let expected = [0.02, -0.0098, 0.0396, -0.0190];
        for (value, want) in daily[1..].iter().zip(expected) {
            assert!((value.unwrap() - want).abs() < 1e-4);
        }

        let cumulative = out.value(IndicatorColumn::CumulativeReturn, 4).unwrap();
        assert!((cumulative - 0.03).abs() < 1e-9);

        // Five rows never reach a 20-row volatility window
        assert!(out
            .column(IndicatorColumn::Volatility(20))
            .unwrap()
            .iter()
            .all(Option::is_none));
    }

    #[test]
    fn test_empty_series_is_absent() {
        let series = make_series("NONE", &[]);
        assert!(IndicatorEngine::default().compute(&series).is_none());
    }

    #[test]
    fn test_undefined_prices_are_absent() {
        let mut series = make_series("NAN", &[10.0, 11.0, 12.0]);
        series.rows[1].close = f64::NAN;
        assert!(IndicatorEngine::default().compute(&series).is_none());
    }

    #[test]
    fn test_configured_periods_drive_columns() {
        let config = IndicatorConfig {
            sma_periods: vec![5],
            ema_periods: vec![3, 8],
            ..Default::default()
        };
        let series = make_series("CFG", &trending_closes(30));
        let out = IndicatorEngine::new(config).compute(&series).unwrap();

        assert!(out.column(IndicatorColumn::Sma(5)).is_some());
        assert!(out.column(IndicatorColumn::Sma(20)).is_none());
        assert!(out.column(IndicatorColumn::Ema(8)).is_some());
        assert_eq!(out.value(IndicatorColumn::Sma(5), 3), None);
        assert!(out.value(IndicatorColumn::Sma(5), 4).is_some());
    }

    #[test]
    fn test_latest_snapshot() {
        let series = make_series("SNAP", &trending_closes(60));
        let out = IndicatorEngine::default().compute(&series).unwrap();
        let snap = out.latest().unwrap();

        assert_eq!(snap.timestamp, *out.timestamps().last().unwrap());
        assert!(snap.get(IndicatorColumn::Rsi).is_some());
        assert!(snap.get(IndicatorColumn::Sma(50)).is_some());
        // 60 rows cannot fill a 200-bar window
        assert_eq!(snap.get(IndicatorColumn::Sma(200)), None);
    }

    #[test]
    fn test_rows_roundtrip_through_from_rows() {
        let series = make_series("ROWS", &trending_closes(40));
        let out = IndicatorEngine::default().compute(&series).unwrap();
        let rebuilt = IndicatorSeries::from_rows("ROWS", out.rows());
        assert_eq!(rebuilt, out);
    }

    #[test]
    fn test_snapshot_serializes_field_names() {
        let series = make_series("JSON", &trending_closes(30));
        let snap = IndicatorEngine::default()
            .compute(&series)
            .unwrap()
            .latest()
            .unwrap();
        let json = serde_json::to_value(&snap).unwrap();
        assert!(json["indicators"]["sma_20"].is_number());
        let back: TechnicalSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }
}
