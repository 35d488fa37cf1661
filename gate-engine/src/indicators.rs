//! Technical indicators used by the gates.
//!
//! All functions are pure and take ascending series. Scalar indicators return
//! the value at the last element, or `None` when the series is too short for
//! the requested period.

use statrs::statistics::Statistics;

use crate::data::OhlcvBar;

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(values[values.len() - period..].iter().mean())
}

/// True range series. The first bar has no previous close and uses high - low.
pub fn true_range(bars: &[OhlcvBar]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(bars.len());
    for (i, bar) in bars.iter().enumerate() {
        if i == 0 {
            tr.push(bar.range());
            continue;
        }
        let prev_close = bars[i - 1].close;
        tr.push(
            bar.range()
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs()),
        );
    }
    tr
}

/// Average true range with Wilder smoothing.
///
/// Needs `period + 1` bars: the seed is the mean of the first `period` true
/// ranges that have a previous close.
pub fn atr(bars: &[OhlcvBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let tr = true_range(bars);
    let seed = tr[1..=period].iter().mean();
    let p = period as f64;
    Some(
        tr[period + 1..]
            .iter()
            .fold(seed, |prev, v| (prev * (p - 1.0) + v) / p),
    )
}

/// On-balance volume series starting at zero.
pub fn obv(bars: &[OhlcvBar]) -> Vec<f64> {
    let mut out = Vec::with_capacity(bars.len());
    let mut acc = 0.0;
    for (i, bar) in bars.iter().enumerate() {
        if i > 0 {
            let prev_close = bars[i - 1].close;
            if bar.close > prev_close {
                acc += bar.volume;
            } else if bar.close < prev_close {
                acc -= bar.volume;
            }
        }
        out.push(acc);
    }
    out
}

/// Last bar's volume divided by the mean volume of the `lookback` bars before it.
pub fn volume_ratio(bars: &[OhlcvBar], lookback: usize) -> Option<f64> {
    if lookback == 0 || bars.len() < lookback + 1 {
        return None;
    }
    let n = bars.len();
    let avg = bars[n - 1 - lookback..n - 1].iter().map(|b| b.volume).mean();
    if avg <= 0.0 {
        return None;
    }
    Some(bars[n - 1].volume / avg)
}

/// Least-squares slope of `values` against their index.
pub fn linear_slope(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let x_mean = (n as f64 - 1.0) / 2.0;
    let y_mean = values.iter().mean();
    let (num, den) = values
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(num, den), (i, y)| {
            let dx = i as f64 - x_mean;
            (num + dx * (y - y_mean), den + dx * dx)
        });
    Some(num / den)
}

/// Highest high across `bars`.
pub fn highest_high(bars: &[OhlcvBar]) -> Option<f64> {
    bars.iter().map(|b| b.high).reduce(f64::max)
}

/// Lowest low across `bars`.
pub fn lowest_low(bars: &[OhlcvBar]) -> Option<f64> {
    bars.iter().map(|b| b.low).reduce(f64::min)
}

/// Simple returns between consecutive values. Pairs with a non-positive base
/// are skipped.
pub fn returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Sample mean and standard deviation. `None` for fewer than two values.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    Some((values.iter().mean(), values.iter().std_dev()))
}

/// Time-series relative-strength rank in [0, 1].
///
/// Builds the stock/benchmark close ratio over the last `lookback + 1`
/// aligned sessions and returns the share of the prior `lookback` ratios that
/// the current ratio is at or above.
pub fn rs_rank(stock_closes: &[f64], benchmark_closes: &[f64], lookback: usize) -> Option<f64> {
    let need = lookback + 1;
    if lookback == 0 || stock_closes.len() < need || benchmark_closes.len() < need {
        return None;
    }
    let stock = &stock_closes[stock_closes.len() - need..];
    let bench = &benchmark_closes[benchmark_closes.len() - need..];
    if bench.iter().any(|b| *b <= 0.0) {
        return None;
    }

    let ratios: Vec<f64> = stock.iter().zip(bench).map(|(s, b)| s / b).collect();
    let current = ratios[lookback];
    let at_or_below = ratios[..lookback].iter().filter(|r| **r <= current).count();
    Some(at_or_below as f64 / lookback as f64)
}
