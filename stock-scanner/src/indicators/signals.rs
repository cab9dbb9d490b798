//! Discrete trading signals read off an indicator series.

use serde::{Deserialize, Serialize};

use super::{IndicatorColumn, IndicatorSeries};

/// RSI level under which a ticker reads as oversold.
pub const RSI_OVERSOLD: f64 = 30.0;
/// RSI level over which a ticker reads as overbought.
pub const RSI_OVERBOUGHT: f64 = 70.0;

const FAST_TREND: IndicatorColumn = IndicatorColumn::Sma(50);
const SLOW_TREND: IndicatorColumn = IndicatorColumn::Sma(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// SMA 50 crossed above SMA 200 on the last bar
    GoldenCross,
    /// SMA 50 crossed below SMA 200 on the last bar
    DeathCross,
    RsiOversold,
    RsiOverbought,
    /// MACD crossed above its signal line on the last bar
    MacdBullishCrossover,
    /// MACD crossed below its signal line on the last bar
    MacdBearishCrossover,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::GoldenCross => "Golden cross (SMA 50 above SMA 200)",
            Self::DeathCross => "Death cross (SMA 50 below SMA 200)",
            Self::RsiOversold => "RSI oversold",
            Self::RsiOverbought => "RSI overbought",
            Self::MacdBullishCrossover => "MACD bullish crossover",
            Self::MacdBearishCrossover => "MACD bearish crossover",
        };
        f.write_str(text)
    }
}

/// Values of two columns on the last two bars, when all four are defined.
fn last_two(
    series: &IndicatorSeries,
    a: IndicatorColumn,
    b: IndicatorColumn,
) -> Option<((f64, f64), (f64, f64))> {
    let last = series.len().checked_sub(1)?;
    let prev = last.checked_sub(1)?;
    Some((
        (series.value(a, prev)?, series.value(b, prev)?),
        (series.value(a, last)?, series.value(b, last)?),
    ))
}

/// Whether `a` moved from at-or-below `b` to above it on the last bar.
fn crossed_above(series: &IndicatorSeries, a: IndicatorColumn, b: IndicatorColumn) -> bool {
    last_two(series, a, b).is_some_and(|((pa, pb), (la, lb))| pa <= pb && la > lb)
}

fn crossed_below(series: &IndicatorSeries, a: IndicatorColumn, b: IndicatorColumn) -> bool {
    last_two(series, a, b).is_some_and(|((pa, pb), (la, lb))| pa >= pb && la < lb)
}

/// All signals active on the final bar.
pub fn detect(series: &IndicatorSeries) -> Vec<Signal> {
    let mut signals = Vec::new();

    if crossed_above(series, FAST_TREND, SLOW_TREND) {
        signals.push(Signal::GoldenCross);
    }
    if crossed_below(series, FAST_TREND, SLOW_TREND) {
        signals.push(Signal::DeathCross);
    }

    match series.last_value(IndicatorColumn::Rsi) {
        Some(rsi) if rsi < RSI_OVERSOLD => signals.push(Signal::RsiOversold),
        Some(rsi) if rsi > RSI_OVERBOUGHT => signals.push(Signal::RsiOverbought),
        _ => {}
    }

    if crossed_above(series, IndicatorColumn::Macd, IndicatorColumn::MacdSignal) {
        signals.push(Signal::MacdBullishCrossover);
    }
    if crossed_below(series, IndicatorColumn::Macd, IndicatorColumn::MacdSignal) {
        signals.push(Signal::MacdBearishCrossover);
    }

    signals
}
