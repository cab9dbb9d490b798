//! Fixed-formula indicator math.
//!
//! Every function returns one value per input row. Rows before an
//! indicator's warm-up window are `None`; they are never zero-filled.

use statrs::statistics::Statistics;

/// Simple moving average over `period` closes.
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Simple moving average over an optional series; a window containing any
/// `None` yields `None`.
pub fn sma_opt(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| window.iter().sum::<f64>() / window.len() as f64)
}

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded with
/// the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    ema_opt(&wrapped, period)
}

/// EMA over the first contiguous run of defined values.
pub fn ema_opt(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return out;
    };
    if period == 0 || values.len() - start < period {
        return out;
    }

    let seed = &values[start..start + period];
    if seed.iter().any(Option::is_none) {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = seed.iter().flatten().sum::<f64>() / period as f64;
    out[start + period - 1] = Some(prev);

    for i in start + period..values.len() {
        let Some(v) = values[i] else { break };
        prev = alpha.mul_add(v, (1.0 - alpha) * prev);
        out[i] = Some(prev);
    }
    out
}

/// Wilder smoothing: seeded with the mean of the first `period` defined
/// values, then `prev + (value - prev) / period`.
pub fn wilder(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    let Some(start) = values.iter().position(Option::is_some) else {
        return out;
    };
    if period == 0 || values.len() - start < period {
        return out;
    }

    let seed = &values[start..start + period];
    if seed.iter().any(Option::is_none) {
        return out;
    }

    let mut prev = seed.iter().flatten().sum::<f64>() / period as f64;
    out[start + period - 1] = Some(prev);

    for i in start + period..values.len() {
        let Some(v) = values[i] else { break };
        prev += (v - prev) / period as f64;
        out[i] = Some(prev);
    }
    out
}

/// Apply `f` to every full window of defined values.
fn rolling(
    values: &[Option<f64>],
    window: usize,
    f: impl Fn(&[f64]) -> f64,
) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let mut buf = Vec::with_capacity(window);
    for i in window - 1..values.len() {
        buf.clear();
        buf.extend(values[i + 1 - window..=i].iter().flatten());
        if buf.len() == window {
            out[i] = Some(f(&buf));
        }
    }
    out
}

/// Rolling sample standard deviation (ddof = 1).
pub fn rolling_sample_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window < 2 {
        return vec![None; values.len()];
    }
    rolling(values, window, |w| w.iter().std_dev())
}

/// Rolling population standard deviation (ddof = 0).
pub fn rolling_population_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |w| w.iter().population_std_dev())
}

// ============================================================================
// Oscillators
// ============================================================================

/// Relative strength index using Wilder-smoothed average gain and loss.
///
/// The first value appears at index `period`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut gains = vec![None; n];
    let mut losses = vec![None; n];
    for i in 1..n {
        let change = closes[i] - closes[i - 1];
        gains[i] = Some(change.max(0.0));
        losses[i] = Some((-change).max(0.0));
    }

    let avg_gain = wilder(&gains, period);
    let avg_loss = wilder(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(g, l)| match (g, l) {
            (Some(g), Some(l)) => Some(if *l == 0.0 {
                if *g == 0.0 {
                    50.0
                } else {
                    100.0
                }
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }),
            _ => None,
        })
        .collect()
}

pub struct Macd {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// MACD line, signal line, and histogram.
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);

    let macd: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema_opt(&macd, signal_period);
    let histogram = macd
        .iter()
        .zip(&signal)
        .map(|(m, s)| Some((*m)? - (*s)?))
        .collect();

    Macd {
        macd,
        signal,
        histogram,
    }
}

pub struct Stochastic {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
}

/// Slow stochastic: raw %K over `k_period`, smoothed by `smooth`, with %D
/// the `d_period` SMA of %K. A flat range reads as 50.
pub fn stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    smooth: usize,
    d_period: usize,
) -> Stochastic {
    let n = closes.len();
    let mut raw = vec![None; n];
    if k_period > 0 && n >= k_period {
        for i in k_period - 1..n {
            let window = i + 1 - k_period..=i;
            let hh = highs[window.clone()].iter().copied().fold(f64::MIN, f64::max);
            let ll = lows[window].iter().copied().fold(f64::MAX, f64::min);
            raw[i] = Some(if hh == ll {
                50.0
            } else {
                100.0 * (closes[i] - ll) / (hh - ll)
            });
        }
    }

    let k = sma_opt(&raw, smooth);
    let d = sma_opt(&k, d_period);
    Stochastic { k, d }
}

// ============================================================================
// Volatility & Trend
// ============================================================================

pub struct Bands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bollinger bands: SMA middle, `num_std` population standard deviations wide.
pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> Bands {
    let middle = sma(closes, period);
    let wrapped: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
    let std = rolling_population_std(&wrapped, period);

    let upper = middle
        .iter()
        .zip(&std)
        .map(|(m, s)| Some((*m)? + num_std * (*s)?))
        .collect();
    let lower = middle
        .iter()
        .zip(&std)
        .map(|(m, s)| Some((*m)? - num_std * (*s)?))
        .collect();

    Bands {
        upper,
        middle,
        lower,
    }
}

/// True range; undefined on the first bar, which has no previous close.
pub fn true_range(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    for i in 1..closes.len() {
        let prev_close = closes[i - 1];
        let tr = (highs[i] - lows[i])
            .max((highs[i] - prev_close).abs())
            .max((lows[i] - prev_close).abs());
        out[i] = Some(tr);
    }
    out
}

/// Average true range, Wilder smoothed. The first value appears at index `period`.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<Option<f64>> {
    wilder(&true_range(highs, lows, closes), period)
}

pub struct Adx {
    pub adx: Vec<Option<f64>>,
    pub di_plus: Vec<Option<f64>>,
    pub di_minus: Vec<Option<f64>>,
}

/// Average directional index with the +DI / -DI lines.
///
/// DI values start at index `period`, ADX at `2 * period - 1`.
pub fn adx(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Adx {
    let n = closes.len();
    let mut plus_dm = vec![None; n];
    let mut minus_dm = vec![None; n];
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm[i] = Some(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm[i] = Some(if down > up && down > 0.0 { down } else { 0.0 });
    }

    let tr = wilder(&true_range(highs, lows, closes), period);
    let plus = wilder(&plus_dm, period);
    let minus = wilder(&minus_dm, period);

    let directional = |dm: &[Option<f64>]| -> Vec<Option<f64>> {
        dm.iter()
            .zip(&tr)
            .map(|(dm, tr)| {
                let (dm, tr) = ((*dm)?, (*tr)?);
                Some(if tr == 0.0 { 0.0 } else { 100.0 * dm / tr })
            })
            .collect()
    };
    let di_plus = directional(&plus);
    let di_minus = directional(&minus);

    let dx: Vec<Option<f64>> = di_plus
        .iter()
        .zip(&di_minus)
        .map(|(p, m)| {
            let (p, m) = ((*p)?, (*m)?);
            let sum = p + m;
            Some(if sum == 0.0 { 0.0 } else { 100.0 * (p - m).abs() / sum })
        })
        .collect();

    Adx {
        adx: wilder(&dx, period),
        di_plus,
        di_minus,
    }
}

// ============================================================================
// Volume & Returns
// ============================================================================

/// On-balance volume, starting from the first bar's volume.
pub fn obv(closes: &[f64], volumes: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(closes.len());
    let mut total = 0.0;
    for i in 0..closes.len() {
        let sign = if i == 0 {
            1.0
        } else if closes[i] > closes[i - 1] {
            1.0
        } else if closes[i] < closes[i - 1] {
            -1.0
        } else {
            0.0
        };
        total += sign * volumes[i];
        out.push(Some(total));
    }
    out
}

/// `close[t] / close[t-1] - 1`, undefined at t = 0.
pub fn daily_returns(closes: &[f64]) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    for i in 1..closes.len() {
        if closes[i - 1] != 0.0 {
            out[i] = Some(closes[i] / closes[i - 1] - 1.0);
        }
    }
    out
}

/// Compounded return since the first bar; undefined entries are skipped.
pub fn cumulative_returns(daily: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut growth = 1.0;
    daily
        .iter()
        .map(|r| {
            let r = (*r)?;
            growth *= 1.0 + r;
            Some(growth - 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Option<f64>, b: f64) {
        let a = a.expect("value should be defined");
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_sma_warm_up() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_close(out[2], 2.0);
        assert_close(out[4], 4.0);
    }

    #[test]
    fn test_sma_period_longer_than_series() {
        assert!(sma(&[1.0, 2.0], 5).iter().all(Option::is_none));
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let out = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out[1], None);
        assert_close(out[2], 2.0);
        // alpha = 0.5
        assert_close(out[3], 3.0);
        assert_close(out[4], 4.0);
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&rising, 14);
        assert_eq!(out[13], None);
        assert_close(out[14], 100.0);

        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_close(rsi(&falling, 14)[20], 0.0);

        let flat = vec![50.0; 30];
        assert_close(rsi(&flat, 14)[20], 50.0);
    }

    #[test]
    fn test_rsi_mixed_series_in_range() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0)
            .collect();
        for v in rsi(&closes, 14).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v));
        }
    }

    #[test]
    fn test_macd_warm_up() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let m = macd(&closes, 12, 26, 9);
        assert_eq!(m.macd[24], None);
        assert!(m.macd[25].is_some());
        assert_eq!(m.signal[32], None);
        assert!(m.signal[33].is_some());
        let hist = m.histogram[40].unwrap();
        assert!((hist - (m.macd[40].unwrap() - m.signal[40].unwrap())).abs() < 1e-12);
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let closes = vec![10.0; 25];
        let bands = bollinger(&closes, 20, 2.0);
        assert_eq!(bands.upper[18], None);
        assert_close(bands.upper[19], 10.0);
        assert_close(bands.lower[24], 10.0);
    }

    #[test]
    fn test_bollinger_width() {
        let closes: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 }).collect();
        let bands = bollinger(&closes, 20, 2.0);
        assert_close(bands.middle[19], 10.0);
        assert_close(bands.upper[19], 12.0);
        assert_close(bands.lower[19], 8.0);
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let tr = true_range(&[10.0, 12.0], &[9.0, 11.0], &[9.5, 11.5]);
        assert_eq!(tr[0], None);
        // |12 - 9.5| dominates 12 - 11
        assert_close(tr[1], 2.5);
    }

    #[test]
    fn test_atr_constant_range() {
        let n = 30;
        let highs = vec![11.0; n];
        let lows = vec![9.0; n];
        let closes = vec![10.0; n];
        let out = atr(&highs, &lows, &closes, 14);
        assert_eq!(out[13], None);
        assert_close(out[14], 2.0);
        assert_close(out[29], 2.0);
    }

    #[test]
    fn test_adx_warm_up_and_trend() {
        let n = 60;
        let closes: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();

        let out = adx(&highs, &lows, &closes, 14);
        assert_eq!(out.di_plus[13], None);
        assert!(out.di_plus[14].is_some());
        assert_eq!(out.adx[26], None);
        assert!(out.adx[27].is_some());

        // Steady uptrend: no downward movement at all
        assert_close(out.di_minus[40], 0.0);
        assert_close(out.adx[40], 100.0);
    }

    #[test]
    fn test_stochastic_warm_up_and_bounds() {
        let n = 40;
        let closes: Vec<f64> = (0..n).map(|i| 50.0 + (i as f64 * 0.5).cos() * 3.0).collect();
        let highs: Vec<f64> = closes.iter().map(|c| c + 0.5).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 0.5).collect();

        let s = stochastic(&highs, &lows, &closes, 14, 3, 3);
        assert_eq!(s.k[14], None);
        assert!(s.k[15].is_some());
        assert_eq!(s.d[16], None);
        assert!(s.d[17].is_some());
        for v in s.k.iter().chain(&s.d).flatten() {
            assert!((0.0..=100.0).contains(v));
        }
    }

    #[test]
    fn test_obv_direction() {
        let out = obv(&[10.0, 11.0, 10.5, 10.5], &[100.0, 200.0, 50.0, 70.0]);
        assert_eq!(out, vec![Some(100.0), Some(300.0), Some(250.0), Some(250.0)]);
    }

    #[test]
    fn test_returns_example() {
        let daily = daily_returns(&[100.0, 102.0, 101.0, 105.0, 103.0]);
        assert_eq!(daily[0], None);
        assert_close(daily[1], 0.02);
        assert!((daily[2].unwrap() - -0.0098).abs() < 1e-4);
        assert!((daily[3].unwrap() - 0.0396).abs() < 1e-4);
        assert!((daily[4].unwrap() - -0.0190).abs() < 1e-4);

        let cumulative = cumulative_returns(&daily);
        assert_eq!(cumulative[0], None);
        assert!((cumulative[4].unwrap() - 0.03).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_sample_std_needs_full_window() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 * 1.01f64.powi(i)).collect();
        let daily = daily_returns(&closes);
        let vol = rolling_sample_std(&daily, 20);
        assert_eq!(vol[19], None);
        // Constant growth rate: zero dispersion
        assert!(vol[20].unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_rolling_sample_std_uses_ddof_one() {
        let values = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let out = rolling_sample_std(&values, 4);
        // var = 5/3
        assert_close(out[3], (5.0f64 / 3.0).sqrt());
    }
}
