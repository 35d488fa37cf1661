//! Entry signal generator.
//!
//! Detects a daily entry pattern and validates the intraday hard checks. No
//! pattern or a failed check is a normal "no trade" outcome; too few bars is
//! an input error.
//!
//! # Signal Flow
//!
//! ```text
//! daily bars ──► patterns::detect ──┐
//!                                   ├──► EntrySignal (pattern + checks + ATR stop)
//! 1m / 15m bars ──► intraday checks ┘
//! ```

pub mod intraday;
pub mod patterns;

pub use intraday::IntradayChecks;
pub use patterns::PatternKind;

use gate_common::config::SignalThresholds;
use serde::{Deserialize, Serialize};

use crate::data::OhlcvBar;
use crate::error::{GateError, GateResult};
use crate::indicators;

/// A validated entry signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySignal {
    pub symbol: String,
    pub pattern: PatternKind,
    pub checks: IntradayChecks,
    /// Last daily close
    pub reference_price: f64,
    /// Daily ATR over the configured period
    pub atr: f64,
    /// reference_price - stop_atr_k * ATR
    pub suggested_stop: f64,
}

/// Full audit of one signal evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    /// Every matching pattern, highest priority first
    pub matched: Vec<PatternKind>,
    pub checks: IntradayChecks,
    pub signal: Option<EntrySignal>,
}

impl SignalReport {
    /// Why no signal was produced.
    pub fn failure(&self) -> Option<&'static str> {
        if self.signal.is_some() {
            None
        } else if self.matched.is_empty() {
            Some("no_pattern")
        } else {
            self.checks.first_failure()
        }
    }
}

#[derive(Debug, Clone)]
pub struct EntrySignalGenerator {
    thresholds: SignalThresholds,
}

impl EntrySignalGenerator {
    pub fn new(thresholds: SignalThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &SignalThresholds {
        &self.thresholds
    }

    /// `GenerateSignal`: the signal, or `None` when nothing qualifies.
    pub fn generate(
        &self,
        symbol: &str,
        daily: &[OhlcvBar],
        m1: &[OhlcvBar],
        m15: &[OhlcvBar],
    ) -> GateResult<Option<EntrySignal>> {
        Ok(self.evaluate(symbol, daily, m1, m15)?.signal)
    }

    /// Pattern detection plus intraday checks, with the full audit trail.
    pub fn evaluate(
        &self,
        symbol: &str,
        daily: &[OhlcvBar],
        m1: &[OhlcvBar],
        m15: &[OhlcvBar],
    ) -> GateResult<SignalReport> {
        let t = &self.thresholds;
        require_bars(symbol, "daily", daily, patterns::min_daily_bars(t))?;
        require_bars(symbol, "1m", m1, intraday::min_minute_bars(t))?;
        require_bars(symbol, "15m", m15, intraday::min_quarter_bars(t))?;

        let matched = patterns::detect_all(daily, t);
        let checks = intraday::run_checks(m1, m15, t);

        let signal = match matched.first() {
            Some(&pattern) if checks.all_passed() => {
                let atr = indicators::atr(daily, t.atr_period)
                    .ok_or_else(|| GateError::input(format!("{symbol}: ATR unavailable")))?;
                let reference_price = daily[daily.len() - 1].close;
                Some(EntrySignal {
                    symbol: symbol.to_string(),
                    pattern,
                    checks: checks.clone(),
                    reference_price,
                    atr,
                    suggested_stop: reference_price - t.stop_atr_k * atr,
                })
            }
            _ => None,
        };

        let report = SignalReport {
            matched,
            checks,
            signal,
        };
        match &report.signal {
            Some(s) => tracing::info!(
                symbol = %symbol,
                pattern = %s.pattern,
                reference_price = s.reference_price,
                suggested_stop = s.suggested_stop,
                "Entry signal generated"
            ),
            None => tracing::debug!(
                symbol = %symbol,
                failure = report.failure().unwrap_or("-"),
                "No entry signal"
            ),
        }
        Ok(report)
    }
}

fn require_bars(symbol: &str, label: &str, bars: &[OhlcvBar], needed: usize) -> GateResult<()> {
    if bars.len() < needed {
        return Err(GateError::input(format!(
            "{symbol}: {} {label} bars, need {needed}",
            bars.len()
        )));
    }
    if let Some(other) = bars.iter().find(|b| b.symbol != symbol) {
        return Err(GateError::input(format!(
            "{symbol}: {label} series contains bars for {}",
            other.symbol
        )));
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn generator() -> EntrySignalGenerator {
        EntrySignalGenerator::new(SignalThresholds::default())
    }

    #[test]
    fn test_breakout_signal_with_atr_stop() {
        let s = "600519";
        let signal = generator()
            .generate(s, &breakout_daily(s), &healthy_minutes(s), &rising_quarters(s))
            .unwrap()
            .expect("signal");
        assert_eq!(signal.pattern, PatternKind::Breakout);
        assert_eq!(signal.reference_price, 13.1);
        assert!(signal.atr > 0.0);
        assert!((signal.suggested_stop - (13.1 - 1.5 * signal.atr)).abs() < 1e-9);
    }

    #[test]
    fn test_report_lists_lower_priority_matches() {
        let s = "600519";
        let report = generator()
            .evaluate(s, &breakout_daily(s), &healthy_minutes(s), &rising_quarters(s))
            .unwrap();
        assert_eq!(report.matched, vec![PatternKind::Breakout, PatternKind::Continuation]);
        assert_eq!(report.signal.unwrap().pattern, PatternKind::Breakout);
    }

    #[test]
    fn test_no_pattern_is_not_an_error() {
        let s = "600519";
        let report = generator()
            .evaluate(s, &flat_daily(s), &healthy_minutes(s), &rising_quarters(s))
            .unwrap();
        assert!(report.signal.is_none());
        assert_eq!(report.failure(), Some("no_pattern"));
    }

    #[test]
    fn test_failed_intraday_check_suppresses_signal() {
        let s = "600519";
        let mut m1 = healthy_minutes(s);
        m1.last_mut().unwrap().volume = 900.0;
        let report = generator()
            .evaluate(s, &breakout_daily(s), &m1, &rising_quarters(s))
            .unwrap();
        assert!(report.signal.is_none());
        assert_eq!(report.failure(), Some("volume_ratio"));
    }

    #[test]
    fn test_short_series_is_input_error() {
        let s = "600519";
        let daily = breakout_daily(s);
        let err = generator()
            .generate(s, &daily[..10], &healthy_minutes(s), &rising_quarters(s))
            .unwrap_err();
        assert!(matches!(err, GateError::Input(_)));

        let err = generator()
            .generate(s, &daily, &healthy_minutes(s)[..5], &rising_quarters(s))
            .unwrap_err();
        assert!(err.to_string().contains("1m"));
    }

    #[test]
    fn test_foreign_bars_are_input_error() {
        let s = "600519";
        let err = generator()
            .generate(s, &breakout_daily("000001"), &healthy_minutes(s), &rising_quarters(s))
            .unwrap_err();
        assert!(err.to_string().contains("000001"));
    }
}
