//! Stock selector: leader and second-line classification within a passing sector.
//!
//! # Rules
//!
//! - Avoid list first: ST names, new listings and externally flagged names are
//!   rejected whatever else they score.
//! - First-line leader: among members ranked inside the top turnover band that
//!   hit limit-up today with enough intraday strength, the earliest limit-up
//!   wins (ties: higher capital footprint, then symbol). A member already on
//!   its Nth consecutive limit-up is too extended to enter and is rejected.
//! - Second-line: every band check must hold (turnover rank, market cap, P/E,
//!   footprint, relative strength) plus the configured position checks
//!   (distance from the 20-day MA, distance below the high, net inflow).
//! - Relative strength comes from the candidate when supplied, otherwise it is
//!   ranked from its daily closes against the benchmark over `rs_lookback`.
//! - First-line takes precedence; a symbol is never both.

use std::cmp::Ordering;

use gate_common::config::SelectorThresholds;
use serde::{Deserialize, Serialize};

use crate::data::StockCandidate;
use crate::indicators;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    FirstLine,
    SecondLine,
    Rejected,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstLine => "first_line",
            Self::SecondLine => "second_line",
            Self::Rejected => "rejected",
        }
    }
}

/// Classification of one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub symbol: String,
    pub classification: Classification,
    pub turnover_rank: Option<u32>,
    pub footprint_score: Option<f64>,
    /// Relative-strength rank used for the second-line check
    pub rs_rank: Option<f64>,
    /// Why the symbol was rejected
    pub reason: Option<String>,
    /// Every second-line check the symbol missed
    pub failed_checks: Vec<String>,
}

impl Selection {
    fn new(candidate: &StockCandidate, classification: Classification) -> Self {
        Self {
            symbol: candidate.symbol.clone(),
            classification,
            turnover_rank: candidate.turnover_rank,
            footprint_score: candidate.footprint_score,
            rs_rank: candidate.rs_rank,
            reason: None,
            failed_checks: Vec::new(),
        }
    }

    fn rejected(candidate: &StockCandidate, reason: &str) -> Self {
        Self {
            reason: Some(reason.to_string()),
            ..Self::new(candidate, Classification::Rejected)
        }
    }
}

#[derive(Debug, Clone)]
pub struct StockSelector {
    thresholds: SelectorThresholds,
}

impl StockSelector {
    pub fn new(thresholds: SelectorThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify every candidate. `benchmark` holds the index closes, oldest
    /// first, that relative strength is measured against.
    ///
    /// Output order: the leader (if any), second-line names by footprint
    /// descending then rank ascending, then rejected names in input order.
    pub fn select(
        &self,
        candidates: &[StockCandidate],
        rotation_passed: bool,
        benchmark: &[f64],
    ) -> Vec<Selection> {
        if !rotation_passed {
            tracing::debug!(count = candidates.len(), "Rotation failed, rejecting all candidates");
            return candidates
                .iter()
                .map(|c| Selection::rejected(c, "rotation_not_passed"))
                .collect();
        }

        let t = &self.thresholds;
        let mut rejected: Vec<(usize, Selection)> = Vec::new();
        let mut eligible: Vec<(usize, &StockCandidate)> = Vec::new();

        for (i, candidate) in candidates.iter().enumerate() {
            match self.avoid_reason(candidate) {
                Some(reason) => rejected.push((i, Selection::rejected(candidate, reason))),
                None => eligible.push((i, candidate)),
            }
        }

        // Leader contenders: top turnover band with a limit-up today.
        let mut contenders: Vec<(usize, &StockCandidate)> = Vec::new();
        let mut rest: Vec<(usize, &StockCandidate)> = Vec::new();
        for (i, candidate) in eligible {
            let top_band = candidate
                .turnover_rank
                .is_some_and(|r| r >= 1 && r <= t.top_turnover_n);
            if top_band && candidate.limit_up_time.is_some() {
                if candidate.consecutive_limit_days >= t.max_consecutive_boards {
                    rejected.push((i, Selection::rejected(candidate, "overextended")));
                } else if !at_least(candidate.intraday_strength, t.strength_score_min) {
                    rejected.push((i, Selection::rejected(candidate, "intraday_strength")));
                } else {
                    contenders.push((i, candidate));
                }
            } else {
                rest.push((i, candidate));
            }
        }

        contenders.sort_by(|(_, a), (_, b)| leader_order(a, b));
        let mut contenders = contenders.into_iter();
        let leader = contenders.next().map(|(_, c)| {
            tracing::info!(
                symbol = %c.symbol,
                limit_up = ?c.limit_up_time,
                rank = ?c.turnover_rank,
                "First-line leader identified"
            );
            Selection::new(c, Classification::FirstLine)
        });
        rest.extend(contenders);
        rest.sort_by_key(|(i, _)| *i);

        let mut second_line: Vec<Selection> = Vec::new();
        for (i, candidate) in rest {
            let rs_rank = self.relative_strength(candidate, benchmark);
            let failed = self.second_line_failures(candidate, rs_rank);
            if failed.is_empty() {
                second_line.push(Selection {
                    rs_rank,
                    ..Selection::new(candidate, Classification::SecondLine)
                });
            } else {
                let mut selection = Selection::rejected(candidate, &failed[0]);
                selection.rs_rank = rs_rank;
                selection.failed_checks = failed;
                rejected.push((i, selection));
            }
        }

        second_line.sort_by(|a, b| {
            b.footprint_score
                .unwrap_or(f64::MIN)
                .total_cmp(&a.footprint_score.unwrap_or(f64::MIN))
                .then_with(|| a.turnover_rank.cmp(&b.turnover_rank))
        });
        rejected.sort_by_key(|(i, _)| *i);

        tracing::info!(
            leader = leader.as_ref().map(|l| l.symbol.as_str()).unwrap_or("-"),
            second_line = second_line.len(),
            rejected = rejected.len(),
            "Stock selection complete"
        );

        leader
            .into_iter()
            .chain(second_line)
            .chain(rejected.into_iter().map(|(_, s)| s))
            .collect()
    }

    /// Hard avoid list. A missing listing age counts as newly listed.
    fn avoid_reason(&self, candidate: &StockCandidate) -> Option<&'static str> {
        let t = &self.thresholds;
        if t.avoid_st && candidate.is_st {
            Some("avoid_st")
        } else if candidate
            .listed_days
            .map_or(true, |d| d <= t.new_stock_days)
        {
            Some("avoid_new_stock")
        } else if t.avoid_risk_flag && candidate.risk_flag {
            Some("avoid_risk_flag")
        } else {
            None
        }
    }

    /// Supplied RS rank, or one ranked from the candidate's closes.
    fn relative_strength(&self, c: &StockCandidate, benchmark: &[f64]) -> Option<f64> {
        c.rs_rank
            .or_else(|| indicators::rs_rank(&c.daily_closes, benchmark, self.thresholds.rs_lookback))
    }

    fn second_line_failures(&self, c: &StockCandidate, rs_rank: Option<f64>) -> Vec<String> {
        let t = &self.thresholds;
        let within = |v: Option<f64>, lo: f64, hi: f64| {
            v.is_some_and(|x| x.is_finite() && x >= lo && x <= hi)
        };
        let above = |v: Option<f64>, min: f64| v.is_some_and(|x| x.is_finite() && x > min);

        let checks = [
            (
                "turnover_rank",
                c.turnover_rank
                    .is_some_and(|r| r >= t.second_rank_min && r <= t.second_rank_max),
            ),
            ("market_cap", within(c.market_cap, t.market_cap_min, t.market_cap_max)),
            ("pe", within(c.pe, t.pe_min, t.pe_max)),
            ("footprint", above(c.footprint_score, t.footprint_min)),
            ("rs_rank", above(rs_rank, t.rs_rank_min)),
            ("distance_ma20", at_most(c.distance_ma20, t.distance_ma20_max)),
            ("distance_high", at_most(c.distance_high, t.distance_high_max)),
            ("net_inflow", at_least(c.net_inflow, t.net_inflow_min)),
        ];

        checks
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| (*name).to_string())
            .collect()
    }
}

/// `value >= min`; a disabled bound always holds, a missing value never does.
fn at_least(value: Option<f64>, min: Option<f64>) -> bool {
    match min {
        None => true,
        Some(min) => value.is_some_and(|v| v.is_finite() && v >= min),
    }
}

/// `value <= max`; a disabled bound always holds, a missing value never does.
fn at_most(value: Option<f64>, max: Option<f64>) -> bool {
    match max {
        None => true,
        Some(max) => value.is_some_and(|v| v.is_finite() && v <= max),
    }
}

/// Earliest limit-up first, then higher footprint, then symbol.
fn leader_order(a: &StockCandidate, b: &StockCandidate) -> Ordering {
    a.limit_up_time
        .cmp(&b.limit_up_time)
        .then_with(|| {
            b.footprint_score
                .unwrap_or(f64::MIN)
                .total_cmp(&a.footprint_score.unwrap_or(f64::MIN))
        })
        .then_with(|| a.symbol.cmp(&b.symbol))
}
