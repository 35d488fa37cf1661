//! Macro filter: the market-wide gate.
//!
//! Hard conditions (fear index, global futures) block outright. Soft
//! conditions are counted: none failing allows full size, one failing allows a
//! probe position, two or more block. A missing or non-finite snapshot field is
//! a failing check.

use gate_common::config::MacroThresholds;
use serde::{Deserialize, Serialize};

use crate::data::MarketSnapshot;
use crate::indicators;

/// Macro gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MacroVerdict {
    Allow,
    Probe,
    Block,
}

impl MacroVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Probe => "PROBE",
            Self::Block => "BLOCK",
        }
    }
}

/// One audited condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroCheck {
    pub name: String,
    /// Observed value, `None` when the snapshot lacked it
    pub value: Option<f64>,
    /// Threshold it was compared against, `None` when it could not be derived
    pub bound: Option<f64>,
    pub passed: bool,
}

impl MacroCheck {
    fn new(name: &str, value: Option<f64>, bound: Option<f64>, passed: bool) -> Self {
        Self {
            name: name.to_string(),
            value,
            bound,
            passed,
        }
    }
}

/// Result of [`MacroFilter::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroAssessment {
    pub verdict: MacroVerdict,
    /// 1.0 for ALLOW, the probe multiplier for PROBE, 0.0 for BLOCK
    pub size_multiplier: f64,
    pub hard_checks: Vec<MacroCheck>,
    /// Empty when a hard condition already blocked
    pub soft_checks: Vec<MacroCheck>,
    pub soft_failures: usize,
    /// Failing condition for PROBE and BLOCK verdicts
    pub reason: Option<String>,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Macro gate with fixed thresholds.
#[derive(Debug, Clone)]
pub struct MacroFilter {
    thresholds: MacroThresholds,
}

impl MacroFilter {
    pub fn new(thresholds: MacroThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &MacroThresholds {
        &self.thresholds
    }

    /// Evaluate a snapshot.
    pub fn evaluate(&self, snapshot: &MarketSnapshot) -> MacroAssessment {
        let t = &self.thresholds;

        let fear = finite(snapshot.fear_index);
        let futures = finite(snapshot.global_futures_pct);
        let hard_checks = vec![
            MacroCheck::new(
                "fear_index",
                fear,
                Some(t.vix_max),
                fear.is_some_and(|v| v <= t.vix_max),
            ),
            MacroCheck::new(
                "global_futures",
                futures,
                Some(t.global_futures_min),
                futures.is_some_and(|v| v >= t.global_futures_min),
            ),
        ];

        if let Some(failed) = hard_checks.iter().find(|c| !c.passed) {
            tracing::info!(
                check = %failed.name,
                value = ?failed.value,
                bound = ?failed.bound,
                "Macro hard condition failed, blocking"
            );
            let reason = Some(failed.name.clone());
            return MacroAssessment {
                verdict: MacroVerdict::Block,
                size_multiplier: 0.0,
                hard_checks,
                soft_checks: Vec::new(),
                soft_failures: 0,
                reason,
            };
        }

        let soft_checks = self.soft_checks(snapshot);
        let failed: Vec<&MacroCheck> = soft_checks.iter().filter(|c| !c.passed).collect();
        let soft_failures = failed.len();

        let (verdict, size_multiplier, reason) = match soft_failures {
            0 => (MacroVerdict::Allow, 1.0, None),
            1 => (
                MacroVerdict::Probe,
                t.probe_multiplier,
                Some(failed[0].name.clone()),
            ),
            _ => (MacroVerdict::Block, 0.0, Some("soft_failures".to_string())),
        };

        for check in &failed {
            tracing::debug!(check = %check.name, value = ?check.value, bound = ?check.bound, "Macro soft condition failed");
        }
        tracing::info!(
            verdict = ?verdict,
            soft_failures,
            size_multiplier,
            "Macro filter evaluated"
        );

        MacroAssessment {
            verdict,
            size_multiplier,
            hard_checks,
            soft_checks,
            soft_failures,
            reason,
        }
    }

    fn soft_checks(&self, snapshot: &MarketSnapshot) -> Vec<MacroCheck> {
        let t = &self.thresholds;

        let close = finite(snapshot.index_close);
        let ma = if snapshot.index_history.iter().all(|v| v.is_finite()) {
            indicators::sma(&snapshot.index_history, t.ma_period)
        } else {
            None
        };
        let breadth = finite(snapshot.breadth_pct);
        let northbound = finite(snapshot.northbound_net_flow);

        let mut checks = vec![
            MacroCheck::new(
                "index_above_ma",
                close,
                ma,
                matches!((close, ma), (Some(c), Some(m)) if c >= m),
            ),
            MacroCheck::new(
                "breadth",
                breadth,
                Some(t.breadth_min),
                breadth.is_some_and(|v| v >= t.breadth_min),
            ),
            MacroCheck::new(
                "northbound",
                northbound,
                Some(t.northbound_min),
                northbound.is_some_and(|v| v >= t.northbound_min),
            ),
        ];

        if let Some(min) = t.overnight_futures_min {
            let overnight = finite(snapshot.overnight_futures_pct);
            checks.push(MacroCheck::new(
                "overnight_futures",
                overnight,
                Some(min),
                overnight.is_some_and(|v| v >= min),
            ));
        }

        checks
    }
}
