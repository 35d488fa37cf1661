//! Intraday hard checks.
//!
//! All four must pass for a signal to stand, whatever the daily pattern:
//! 1m volume ratio, OBV/price slope agreement on 1m bars, 15m higher-high /
//! higher-low structure, and the 1m anomaly filter.

use gate_common::config::SignalThresholds;
use serde::{Deserialize, Serialize};

use crate::data::OhlcvBar;
use crate::indicators;

const SLOPE_EPSILON: f64 = 1e-12;
const DISPERSION_EPSILON: f64 = 1e-12;

/// Outcome of the intraday hard checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntradayChecks {
    /// Last 1m volume over its trailing average
    pub volume_ratio: Option<f64>,
    pub volume_ratio_pass: bool,
    pub obv_slope: Option<f64>,
    pub price_slope: Option<f64>,
    pub obv_consistency_pass: bool,
    pub structure_pass: bool,
    /// Largest 1m return deviation, in standard deviations
    pub max_deviation_sigma: Option<f64>,
    pub anomaly_filter_pass: bool,
}

impl IntradayChecks {
    pub fn all_passed(&self) -> bool {
        self.volume_ratio_pass
            && self.obv_consistency_pass
            && self.structure_pass
            && self.anomaly_filter_pass
    }

    /// Name of the first failing check.
    pub fn first_failure(&self) -> Option<&'static str> {
        if !self.volume_ratio_pass {
            Some("volume_ratio")
        } else if !self.obv_consistency_pass {
            Some("obv_consistency")
        } else if !self.structure_pass {
            Some("structure_15m")
        } else if !self.anomaly_filter_pass {
            Some("anomaly_filter")
        } else {
            None
        }
    }
}

/// 1m bars needed by the checks.
pub fn min_minute_bars(t: &SignalThresholds) -> usize {
    (t.volume_ratio_lookback + 1)
        .max(t.obv_lookback)
        .max(t.anomaly_lookback + 1)
}

/// 15m bars needed by the structure check.
pub fn min_quarter_bars(t: &SignalThresholds) -> usize {
    t.structure_bars + 1
}

fn sign(x: f64) -> i8 {
    if x > SLOPE_EPSILON {
        1
    } else if x < -SLOPE_EPSILON {
        -1
    } else {
        0
    }
}

/// Run all four checks. Callers guarantee the minimum bar counts.
pub fn run_checks(m1: &[OhlcvBar], m15: &[OhlcvBar], t: &SignalThresholds) -> IntradayChecks {
    let volume_ratio = indicators::volume_ratio(m1, t.volume_ratio_lookback);
    let volume_ratio_pass = volume_ratio.is_some_and(|r| r >= t.volume_ratio_min);

    let (obv_slope, price_slope) = obv_and_price_slopes(m1, t.obv_lookback);
    let obv_consistency_pass = matches!(
        (obv_slope, price_slope),
        (Some(o), Some(p)) if sign(o) == sign(p)
    );

    let structure_pass = higher_highs_and_lows(m15, t.structure_bars);

    let max_deviation_sigma = max_return_deviation(m1, t.anomaly_lookback);
    let anomaly_filter_pass = max_deviation_sigma.is_some_and(|z| z <= t.anomaly_sigma);

    let checks = IntradayChecks {
        volume_ratio,
        volume_ratio_pass,
        obv_slope,
        price_slope,
        obv_consistency_pass,
        structure_pass,
        max_deviation_sigma,
        anomaly_filter_pass,
    };
    tracing::debug!(
        volume_ratio = ?checks.volume_ratio,
        obv = checks.obv_consistency_pass,
        structure = checks.structure_pass,
        max_sigma = ?checks.max_deviation_sigma,
        "Intraday checks run"
    );
    checks
}

fn obv_and_price_slopes(m1: &[OhlcvBar], lookback: usize) -> (Option<f64>, Option<f64>) {
    if m1.len() < lookback {
        return (None, None);
    }
    let window = &m1[m1.len() - lookback..];
    let obv = indicators::obv(window);
    let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
    (indicators::linear_slope(&obv), indicators::linear_slope(&closes))
}

/// Each of the last `count` bars makes a higher high and a higher low than
/// the bar before it.
fn higher_highs_and_lows(m15: &[OhlcvBar], count: usize) -> bool {
    if count == 0 || m15.len() < count + 1 {
        return false;
    }
    m15[m15.len() - count - 1..]
        .windows(2)
        .all(|w| w[1].high > w[0].high && w[1].low > w[0].low)
}

/// Largest absolute z-score among the last `lookback` 1m returns, each one
/// scored against the mean and std of the other returns in the window (a bad
/// print is a jump plus a matching revert). A move against a window with zero
/// dispersion is itself an anomaly.
fn max_return_deviation(m1: &[OhlcvBar], lookback: usize) -> Option<f64> {
    if m1.len() < lookback + 1 {
        return None;
    }
    let closes: Vec<f64> = m1[m1.len() - lookback - 1..].iter().map(|b| b.close).collect();
    let rets = indicators::returns(&closes);
    if rets.len() < 3 {
        return None;
    }

    let mut max_z: f64 = 0.0;
    let mut others = Vec::with_capacity(rets.len() - 1);
    for (i, &r) in rets.iter().enumerate() {
        others.clear();
        others.extend(rets.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, &x)| x));
        let (mean, std) = indicators::mean_std(&others)?;
        if !std.is_finite() {
            return None;
        }
        let deviation = (r - mean).abs();
        if deviation >= DISPERSION_EPSILON {
            max_z = max_z.max(deviation / std.max(DISPERSION_EPSILON));
        }
    }
    Some(max_z)
}
