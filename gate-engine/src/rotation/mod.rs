//! Sector rotation validator.
//!
//! Six boolean checks, all required: hot-rank improvement, turnover-weighted
//! breadth, leadership continuation, capital ratio, endorsement, and positive
//! hidden-fund delta. A decay warning is reported separately and never blocks.

use gate_common::config::RotationThresholds;
use serde::{Deserialize, Serialize};

use crate::data::SectorMetrics;

/// Number of rotation checks.
pub const ROTATION_CHECKS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationVerdict {
    Pass,
    Fail,
}

impl RotationVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

/// One audited rotation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationCheck {
    pub name: String,
    pub value: Option<f64>,
    pub bound: Option<f64>,
    pub passed: bool,
}

/// Result of [`RotationValidator::evaluate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationAssessment {
    pub sector_id: String,
    pub verdict: RotationVerdict,
    pub checks: Vec<RotationCheck>,
    pub passed_count: usize,
    /// passed_count / 6, rounded to two decimals
    pub confirm: f64,
    /// Day-3 turnover fell below the configured share of day-1 turnover
    pub decay_warning: bool,
    /// First failing check, if any
    pub reason: Option<String>,
}

impl RotationAssessment {
    pub fn passed(&self) -> bool {
        self.verdict == RotationVerdict::Pass
    }
}

#[derive(Debug, Clone)]
pub struct RotationValidator {
    thresholds: RotationThresholds,
}

impl RotationValidator {
    pub fn new(thresholds: RotationThresholds) -> Self {
        Self { thresholds }
    }

    /// Score a sector's rotation strength.
    pub fn evaluate(&self, metrics: &SectorMetrics) -> RotationAssessment {
        let t = &self.thresholds;
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());

        let rank_change = metrics.rank_change;
        let breadth = finite(metrics.breadth_pct);
        let days = metrics.leadership_days;
        let capital = finite(metrics.capital_ratio);
        let hidden = finite(metrics.hidden_fund_delta);

        let checks = vec![
            RotationCheck {
                name: "rank_change".into(),
                value: rank_change.map(f64::from),
                bound: Some(f64::from(t.rank_change_min)),
                passed: rank_change.is_some_and(|v| v >= t.rank_change_min),
            },
            RotationCheck {
                name: "breadth".into(),
                value: breadth,
                bound: Some(t.breadth_min),
                passed: breadth.is_some_and(|v| v >= t.breadth_min),
            },
            RotationCheck {
                name: "time_continuation".into(),
                value: days.map(f64::from),
                bound: Some(f64::from(t.time_continuation_min)),
                passed: days.is_some_and(|v| v >= t.time_continuation_min),
            },
            RotationCheck {
                name: "capital_ratio".into(),
                value: capital,
                bound: Some(t.capital_ratio_min),
                passed: capital.is_some_and(|v| v >= t.capital_ratio_min),
            },
            RotationCheck {
                name: "endorsement".into(),
                value: None,
                bound: None,
                passed: metrics.endorsed(),
            },
            RotationCheck {
                name: "hidden_funds".into(),
                value: hidden,
                bound: Some(t.hidden_fund_min),
                passed: hidden.is_some_and(|v| v > t.hidden_fund_min),
            },
        ];

        let passed_count = checks.iter().filter(|c| c.passed).count();
        let confirm = (passed_count as f64 / ROTATION_CHECKS as f64 * 100.0).round() / 100.0;
        let reason = checks.iter().find(|c| !c.passed).map(|c| c.name.clone());
        let verdict = if passed_count == ROTATION_CHECKS {
            RotationVerdict::Pass
        } else {
            RotationVerdict::Fail
        };
        let decay_warning = self.decay_warning(metrics);

        tracing::info!(
            sector = %metrics.sector_id,
            verdict = ?verdict,
            passed = passed_count,
            decay_warning,
            "Sector rotation evaluated"
        );

        RotationAssessment {
            sector_id: metrics.sector_id.clone(),
            verdict,
            checks,
            passed_count,
            confirm,
            decay_warning,
            reason,
        }
    }

    /// Day-3 turnover below `decay_fraction` of day-1. Missing turnover counts
    /// as decaying.
    fn decay_warning(&self, metrics: &SectorMetrics) -> bool {
        match (metrics.day1_turnover, metrics.day3_turnover) {
            (Some(d1), Some(d3)) if d1.is_finite() && d3.is_finite() => {
                d3 < self.thresholds.decay_fraction * d1
            }
            _ => true,
        }
    }
}
