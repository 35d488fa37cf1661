//! Daily-bar entry patterns.
//!
//! Patterns are checked in a fixed priority order and the first match wins:
//! BREAKOUT, PULLBACK, CONTINUATION, REVERSAL. [`detect_all`] reports every
//! match for audit.

use gate_common::config::SignalThresholds;
use serde::{Deserialize, Serialize};

use crate::data::OhlcvBar;
use crate::indicators;

/// Entry pattern kinds in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    Breakout,
    Pullback,
    Continuation,
    Reversal,
}

impl PatternKind {
    /// All kinds, highest priority first.
    pub const PRIORITY: [PatternKind; 4] = [
        PatternKind::Breakout,
        PatternKind::Pullback,
        PatternKind::Continuation,
        PatternKind::Reversal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakout => "breakout",
            Self::Pullback => "pullback",
            Self::Continuation => "continuation",
            Self::Reversal => "reversal",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily bars required before any pattern can be judged.
pub fn min_daily_bars(t: &SignalThresholds) -> usize {
    let longest_ma = t
        .continuation_ma_periods
        .iter()
        .copied()
        .max()
        .unwrap_or(0)
        .max(t.pullback_ma_period);
    let pullback_span = t.pullback_window + t.volume_avg_period + 1;
    (t.breakout_lookback + 1)
        .max(t.volume_avg_period + 1)
        .max(longest_ma)
        .max(pullback_span)
        .max(t.atr_period + 1)
        .max(3)
}

/// Highest-priority matching pattern.
pub fn detect(bars: &[OhlcvBar], t: &SignalThresholds) -> Option<PatternKind> {
    PatternKind::PRIORITY
        .into_iter()
        .find(|kind| matches(*kind, bars, t))
}

/// Every matching pattern, in priority order.
pub fn detect_all(bars: &[OhlcvBar], t: &SignalThresholds) -> Vec<PatternKind> {
    PatternKind::PRIORITY
        .into_iter()
        .filter(|kind| matches(*kind, bars, t))
        .collect()
}

fn matches(kind: PatternKind, bars: &[OhlcvBar], t: &SignalThresholds) -> bool {
    if bars.len() < 3 {
        return false;
    }
    match kind {
        PatternKind::Breakout => is_breakout(bars, t),
        PatternKind::Pullback => is_pullback(bars, t),
        PatternKind::Continuation => is_continuation(bars, t),
        PatternKind::Reversal => is_reversal(bars),
    }
}

fn closes(bars: &[OhlcvBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

fn mean_volume(bars: &[OhlcvBar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    Some(bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64)
}

/// Close above the prior N-session high on expanded volume.
fn is_breakout(bars: &[OhlcvBar], t: &SignalThresholds) -> bool {
    let n = bars.len();
    if n < t.breakout_lookback + 1 {
        return false;
    }
    let last = &bars[n - 1];
    let Some(prior_high) = indicators::highest_high(&bars[n - 1 - t.breakout_lookback..n - 1])
    else {
        return false;
    };
    let expanded = indicators::volume_ratio(bars, t.volume_avg_period)
        .is_some_and(|ratio| ratio >= t.volume_expansion);

    last.close > prior_high * (1.0 + t.breakout_margin) && expanded
}

/// Retrace into support (the MA or the prior breakout level) on contracting
/// volume, then a close back above the previous close.
fn is_pullback(bars: &[OhlcvBar], t: &SignalThresholds) -> bool {
    let n = bars.len();
    let window = t.pullback_window;
    if n < window + t.volume_avg_period + 1 {
        return false;
    }
    let last = &bars[n - 1];
    let prev = &bars[n - 2];
    let start = n - 1 - window;

    let contracted = match (
        mean_volume(&bars[start..n - 1]),
        mean_volume(&bars[start - t.volume_avg_period..start]),
    ) {
        (Some(retrace), Some(reference)) if reference > 0.0 => {
            retrace <= t.volume_contraction * reference
        }
        _ => false,
    };
    if !contracted || last.close <= prev.close {
        return false;
    }

    let Some(retrace_low) = indicators::lowest_low(&bars[start..]) else {
        return false;
    };
    let touches = |support: f64| {
        support > 0.0
            && retrace_low <= support * (1.0 + t.pullback_tolerance)
            && last.close > support
    };

    let ma_support = indicators::sma(&closes(bars), t.pullback_ma_period);
    let breakout_level = (start >= t.breakout_lookback)
        .then(|| indicators::highest_high(&bars[start - t.breakout_lookback..start]))
        .flatten();

    ma_support.is_some_and(touches) || breakout_level.is_some_and(touches)
}

/// Moving averages stacked shortest-above-longest, and a bar that dips below
/// the previous close without losing the shortest average.
fn is_continuation(bars: &[OhlcvBar], t: &SignalThresholds) -> bool {
    let n = bars.len();
    let closes = closes(bars);
    let mas: Option<Vec<f64>> = t
        .continuation_ma_periods
        .iter()
        .map(|p| indicators::sma(&closes, *p))
        .collect();
    let Some(mas) = mas else {
        return false;
    };
    if mas.len() < 2 || !mas.windows(2).all(|w| w[0] > w[1]) {
        return false;
    }

    let last = &bars[n - 1];
    let prev = &bars[n - 2];
    let shortest = mas[0];
    last.low < prev.close && last.low >= shortest && last.close >= shortest
}

/// First down day after an up day, engulfed by the following bar.
fn is_reversal(bars: &[OhlcvBar]) -> bool {
    let n = bars.len();
    let before = &bars[n - 3];
    let yin = &bars[n - 2];
    let last = &bars[n - 1];

    !before.is_down()
        && yin.is_down()
        && last.high >= yin.high
        && last.low <= yin.low
        && last.close > yin.open
}
