//! Orchestrator: chains the gates into one decision.
//!
//! ```text
//! macro ──► rotation ──► selector ──► signal ──► risk ──► sentry ──► Decision
//!   │          │            │           │          │         │
//!   └──────────┴────────────┴───────────┴──────────┴─────────┴──► Reject{stage, reason}
//! ```
//!
//! Each stage either passes its output along or ends the evaluation with a
//! `"{stage}:{condition}"` reason. Input errors inside a stage become that
//! stage's rejection; only a sentry state fault escapes as an error.
//!
//! [`Orchestrator::evaluate`] reads the sentry without touching it.
//! [`Orchestrator::admit`] checks and reserves risk in one step, so two
//! admissions racing on the same session cannot both slip under the limit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gate_common::config::ThresholdsConfig;
use gate_common::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{MarketSnapshot, OhlcvBar, SectorMetrics, StockCandidate};
use crate::error::{GateError, GateResult};
use crate::macro_filter::{MacroFilter, MacroVerdict};
use crate::risk::{ExitPlan, RiskGate, RiskGateResult, RiskRequest};
use crate::rotation::RotationValidator;
use crate::selector::{Classification, StockSelector};
use crate::sentry::{AdmissionStatus, Sentry, SentryCheck};
use crate::signal::{EntrySignal, EntrySignalGenerator, PatternKind};

// ============================================================================
// Inputs
// ============================================================================

/// Trade parameters for the risk gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    /// Defaults to the signal's reference price
    #[serde(default)]
    pub entry: Option<f64>,
    /// Defaults to the signal's ATR stop
    #[serde(default)]
    pub stop: Option<f64>,
    pub target: f64,
    pub equity: f64,
    pub pwin: f64,
    #[serde(default)]
    pub open_exposure: f64,
}

/// Everything needed to evaluate one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub snapshot: MarketSnapshot,
    pub sector: SectorMetrics,
    /// The sector's members, including `symbol`
    pub sector_candidates: Vec<StockCandidate>,
    pub daily_bars: Vec<OhlcvBar>,
    pub minute_bars: Vec<OhlcvBar>,
    pub quarter_bars: Vec<OhlcvBar>,
    pub proposal: TradeProposal,
}

// ============================================================================
// Outputs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Macro,
    Rotation,
    Selector,
    Signal,
    Risk,
    Sentry,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Macro => "macro",
            Self::Rotation => "rotation",
            Self::Selector => "selector",
            Self::Signal => "signal",
            Self::Risk => "risk",
            Self::Sentry => "sentry",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub verdict: String,
    pub reason: Option<String>,
}

impl StageRecord {
    fn new(stage: Stage, verdict: &str, reason: Option<String>) -> Self {
        Self {
            stage,
            verdict: verdict.to_string(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub stage: Stage,
    /// `"{stage}:{condition}"`
    pub reason: String,
    pub detail: Option<String>,
}

impl Rejection {
    fn new(stage: Stage, condition: &str, detail: Option<String>) -> Self {
        Self {
            stage,
            reason: format!("{stage}:{condition}"),
            detail,
        }
    }
}

/// A trade cleared by every gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub symbol: String,
    pub pattern: PatternKind,
    pub classification: Classification,
    pub shares: u64,
    /// Product of macro, sentry and decay dampening
    pub size_multiplier: f64,
    pub exit_plan: ExitPlan,
    pub risk: RiskGateResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Execute(Approval),
    Probe(Approval),
    Reject(Rejection),
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Execute(_) => "EXECUTE",
            Self::Probe(_) => "PROBE",
            Self::Reject(_) => "REJECT",
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Reject(r) => Some(r),
            _ => None,
        }
    }

    pub fn approval(&self) -> Option<&Approval> {
        match self {
            Self::Execute(a) | Self::Probe(a) => Some(a),
            Self::Reject(_) => None,
        }
    }
}

/// A decision with its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: Uuid,
    pub symbol: String,
    pub evaluated_at: DateTime<Utc>,
    pub decision: Decision,
    pub trail: Vec<StageRecord>,
    /// Sentry view the decision was made against
    pub sentry: Option<SentryCheck>,
    /// Reservation outcome, for admissions only
    pub admission: Option<AdmissionStatus>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Stage outputs that reach the risk gate.
struct Upstream {
    macro_verdict: MacroVerdict,
    macro_multiplier: f64,
    decay_warning: bool,
    classification: Classification,
    signal: EntrySignal,
}

/// A risk-gate pass with its sizing context.
struct Sized {
    risk: RiskGateResult,
    size_multiplier: f64,
    probe: bool,
    /// Worst-case loss, percent of equity
    risk_pct: f64,
}

pub struct Orchestrator {
    macro_filter: MacroFilter,
    rotation: RotationValidator,
    selector: StockSelector,
    signal: EntrySignalGenerator,
    risk: RiskGate,
    sentry: Arc<Sentry>,
}

impl Orchestrator {
    /// Validate thresholds once. Fails with a config error when any section
    /// is invalid or the sentry was built with different thresholds.
    pub fn new(thresholds: ThresholdsConfig, sentry: Arc<Sentry>) -> GateResult<Self> {
        thresholds.validate()?;
        if sentry.thresholds() != &thresholds.sentry {
            return Err(GateError::Config(
                "sentry was built with different thresholds".into(),
            ));
        }
        Ok(Self {
            macro_filter: MacroFilter::new(thresholds.macro_filter),
            rotation: RotationValidator::new(thresholds.rotation),
            selector: StockSelector::new(thresholds.selector),
            signal: EntrySignalGenerator::new(thresholds.signal),
            risk: RiskGate::new(thresholds.risk),
            sentry,
        })
    }

    pub fn sentry(&self) -> &Arc<Sentry> {
        &self.sentry
    }

    /// `Orchestrator.Evaluate`: a dry run that leaves the sentry untouched.
    pub fn evaluate(&self, candidate: &Candidate) -> GateResult<Evaluation> {
        let mut trail = Vec::new();
        let upstream = match self.upstream(candidate, &mut trail) {
            Ok(upstream) => upstream,
            Err(rejection) => return Ok(self.finish(candidate, Decision::Reject(rejection), trail, None, None)),
        };

        let check = self.sentry.check()?;
        let sized = self.size(candidate, &upstream, &check);
        let decision = self.decide(candidate, &upstream, &check, sized, None, &mut trail);
        Ok(self.finish(candidate, decision, trail, Some(check), None))
    }

    /// Evaluate and, on approval, reserve the trade's risk with the sentry.
    pub fn admit(&self, candidate: &Candidate) -> GateResult<Evaluation> {
        let mut trail = Vec::new();
        let upstream = match self.upstream(candidate, &mut trail) {
            Ok(upstream) => upstream,
            Err(rejection) => return Ok(self.finish(candidate, Decision::Reject(rejection), trail, None, None)),
        };

        let admission = self.sentry.try_admit(|check| {
            let sized = self.size(candidate, &upstream, check);
            let risk_pct = sized.as_ref().ok().map(|s| s.risk_pct);
            (sized, risk_pct)
        })?;
        let decision = self.decide(
            candidate,
            &upstream,
            &admission.check,
            admission.outcome,
            Some(&admission.status),
            &mut trail,
        );
        if let AdmissionStatus::Admitted { reserved_pct } = admission.status {
            tracing::info!(symbol = %candidate.symbol, reserved_pct, "Trade admitted, risk reserved");
        }
        Ok(self.finish(
            candidate,
            decision,
            trail,
            Some(admission.check),
            Some(admission.status),
        ))
    }

    /// Macro, rotation, selector and signal stages.
    fn upstream(&self, c: &Candidate, trail: &mut Vec<StageRecord>) -> Result<Upstream, Rejection> {
        let macro_result = self.macro_filter.evaluate(&c.snapshot);
        trail.push(StageRecord::new(
            Stage::Macro,
            macro_result.verdict.as_str(),
            macro_result.reason.clone(),
        ));
        if macro_result.verdict == MacroVerdict::Block {
            let condition = macro_result.reason.as_deref().unwrap_or("block");
            return Err(Rejection::new(Stage::Macro, condition, None));
        }

        let rotation = self.rotation.evaluate(&c.sector);
        trail.push(StageRecord::new(
            Stage::Rotation,
            rotation.verdict.as_str(),
            rotation.reason.clone(),
        ));
        if !rotation.passed() {
            let condition = rotation.reason.as_deref().unwrap_or("fail");
            return Err(Rejection::new(
                Stage::Rotation,
                condition,
                Some(format!("{}/6 checks passed", rotation.passed_count)),
            ));
        }

        let members = with_own_closes(c);
        let selections = self.selector.select(&members, true, &c.snapshot.index_history);
        let Some(selection) = selections.into_iter().find(|s| s.symbol == c.symbol) else {
            trail.push(StageRecord::new(Stage::Selector, "rejected", Some("not_in_sector".into())));
            return Err(Rejection::new(
                Stage::Selector,
                "not_in_sector",
                Some(format!("{} is not among the sector candidates", c.symbol)),
            ));
        };
        trail.push(StageRecord::new(
            Stage::Selector,
            selection.classification.as_str(),
            selection.reason.clone(),
        ));
        if selection.classification == Classification::Rejected {
            let condition = selection.reason.as_deref().unwrap_or("rejected");
            let detail = (!selection.failed_checks.is_empty()).then(|| selection.failed_checks.join(","));
            return Err(Rejection::new(Stage::Selector, condition, detail));
        }

        let report = match self
            .signal
            .evaluate(&c.symbol, &c.daily_bars, &c.minute_bars, &c.quarter_bars)
        {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(symbol = %c.symbol, error = %err, "Signal input rejected");
                trail.push(StageRecord::new(Stage::Signal, "rejected", Some("input".into())));
                return Err(Rejection::new(Stage::Signal, "input", Some(err.to_string())));
            }
        };
        let failure = report.failure();
        let Some(signal) = report.signal else {
            let condition = failure.unwrap_or("no_signal");
            trail.push(StageRecord::new(Stage::Signal, "rejected", Some(condition.into())));
            return Err(Rejection::new(Stage::Signal, condition, None));
        };
        trail.push(StageRecord::new(Stage::Signal, signal.pattern.as_str(), None));

        Ok(Upstream {
            macro_verdict: macro_result.verdict,
            macro_multiplier: macro_result.size_multiplier,
            decay_warning: rotation.decay_warning,
            classification: selection.classification,
            signal,
        })
    }

    /// Risk gate sized against the sentry's view.
    fn size(&self, c: &Candidate, up: &Upstream, check: &SentryCheck) -> Result<Sized, Rejection> {
        let probe = up.macro_verdict == MacroVerdict::Probe || check.force_probe;
        let mut size_multiplier = up.macro_multiplier.min(check.size_multiplier);
        if up.decay_warning {
            size_multiplier *= self.risk.thresholds().decay_dampening;
        }

        let p = &c.proposal;
        let request = RiskRequest {
            entry: p.entry.unwrap_or(up.signal.reference_price),
            stop: p.stop,
            target: p.target,
            equity: p.equity,
            pwin: p.pwin,
            open_exposure: p.open_exposure,
            size_multiplier,
        };
        let risk = self
            .risk
            .evaluate(&up.signal, &request)
            .map_err(|err| Rejection::new(Stage::Risk, "input", Some(err.to_string())))?;
        if !risk.passed() {
            let condition = risk.reason.as_deref().unwrap_or("reject");
            let detail = format!("rr={:?} pwin={} ev_net={:?}", risk.rr, risk.pwin, risk.ev_net);
            return Err(Rejection::new(Stage::Risk, condition, Some(detail)));
        }

        let max_loss = risk.position.as_ref().map_or(0.0, |pos| pos.max_loss);
        Ok(Sized {
            risk_pct: max_loss / request.equity * 100.0,
            risk,
            size_multiplier,
            probe,
        })
    }

    fn decide(
        &self,
        c: &Candidate,
        up: &Upstream,
        check: &SentryCheck,
        sized: Result<Sized, Rejection>,
        admission: Option<&AdmissionStatus>,
        trail: &mut Vec<StageRecord>,
    ) -> Decision {
        let sized = match sized {
            Ok(sized) => sized,
            Err(rejection) => {
                let condition = rejection.reason.trim_start_matches("risk:").to_string();
                trail.push(StageRecord::new(Stage::Risk, "REJECT", Some(condition)));
                return Decision::Reject(rejection);
            }
        };
        trail.push(StageRecord::new(Stage::Risk, "PASS", None));

        if check.halted() || matches!(admission, Some(AdmissionStatus::Halted)) {
            trail.push(StageRecord::new(Stage::Sentry, check.state.as_str(), Some("halt".into())));
            return Decision::Reject(Rejection::new(
                Stage::Sentry,
                "halt",
                Some(check.state.as_str().to_string()),
            ));
        }
        if let Some(AdmissionStatus::OverBudget { requested_pct }) = admission {
            trail.push(StageRecord::new(Stage::Sentry, check.state.as_str(), Some("risk_budget".into())));
            return Decision::Reject(Rejection::new(
                Stage::Sentry,
                "risk_budget",
                Some(format!(
                    "requested {requested_pct:.3}% with {:.3}% open and daily pnl {:.3}%",
                    check.open_risk_pct, check.daily_pnl_pct
                )),
            ));
        }
        let force_probe = check.force_probe.then(|| "emotion".to_string());
        trail.push(StageRecord::new(Stage::Sentry, check.state.as_str(), force_probe));

        let shares = sized.risk.position.as_ref().map_or(0, |pos| pos.shares);
        let Some(exit_plan) = sized.risk.exit_plan.clone() else {
            return Decision::Reject(Rejection::new(Stage::Risk, "no_exit_plan", None));
        };
        let approval = Approval {
            symbol: c.symbol.clone(),
            pattern: up.signal.pattern,
            classification: up.classification,
            shares,
            size_multiplier: sized.size_multiplier,
            exit_plan,
            risk: sized.risk,
        };
        if sized.probe {
            Decision::Probe(approval)
        } else {
            Decision::Execute(approval)
        }
    }

    fn finish(
        &self,
        c: &Candidate,
        decision: Decision,
        trail: Vec<StageRecord>,
        sentry: Option<SentryCheck>,
        admission: Option<AdmissionStatus>,
    ) -> Evaluation {
        let id = Uuid::new_v4();
        match &decision {
            Decision::Reject(r) => tracing::info!(
                evaluation_id = %id,
                symbol = %c.symbol,
                stage = %r.stage,
                reason = %r.reason,
                "Candidate rejected"
            ),
            Decision::Execute(a) | Decision::Probe(a) => tracing::info!(
                evaluation_id = %id,
                symbol = %c.symbol,
                decision = decision.label(),
                shares = a.shares,
                size_multiplier = a.size_multiplier,
                "Candidate approved"
            ),
        }
        Evaluation {
            id,
            symbol: c.symbol.clone(),
            evaluated_at: Utc::now(),
            decision,
            trail,
            sentry,
            admission,
        }
    }
}

/// Sector members, with the evaluated symbol's daily closes filled in from
/// its bars when the member record carries none. Closes and the index
/// history are aligned on their most recent sessions.
fn with_own_closes(c: &Candidate) -> Vec<StockCandidate> {
    c.sector_candidates
        .iter()
        .cloned()
        .map(|mut member| {
            if member.symbol == c.symbol && member.daily_closes.is_empty() {
                member.daily_closes = c.daily_bars.iter().map(|b| b.close).collect();
            }
            member
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    //! A candidate that clears every gate at full size.

    use super::*;
    use crate::signal::fixtures::{breakout_daily, healthy_minutes, rising_quarters};
    use chrono::{NaiveTime, TimeZone};

    pub const SYMBOL: &str = "600519";

    pub fn calm_snapshot() -> MarketSnapshot {
        MarketSnapshot {
            fear_index: Some(18.0),
            global_futures_pct: Some(0.3),
            overnight_futures_pct: Some(0.1),
            index_close: Some(3900.0),
            index_history: vec![3800.0; 50],
            breadth_pct: Some(62.0),
            northbound_net_flow: Some(25.0),
            ..MarketSnapshot::empty(Utc.with_ymd_and_hms(2024, 1, 31, 1, 0, 0).unwrap())
        }
    }

    pub fn strong_sector() -> SectorMetrics {
        SectorMetrics {
            sector_id: "liquor".into(),
            rank_change: Some(6),
            breadth_pct: Some(65.0),
            leadership_days: Some(3),
            capital_ratio: Some(0.6),
            dragon_tiger: true,
            northbound_confirmed: false,
            hidden_fund_delta: Some(1.2),
            day1_turnover: Some(100.0),
            day3_turnover: Some(90.0),
        }
    }

    pub fn leader() -> StockCandidate {
        StockCandidate {
            turnover_rank: Some(1),
            market_cap: Some(800.0),
            pe: Some(35.0),
            footprint_score: Some(0.8),
            rs_rank: Some(0.9),
            intraday_strength: Some(0.9),
            limit_up_time: NaiveTime::from_hms_opt(9, 45, 0),
            consecutive_limit_days: 1,
            listed_days: Some(900),
            ..StockCandidate::new(SYMBOL, "liquor")
        }
    }

    pub fn candidate() -> Candidate {
        Candidate {
            symbol: SYMBOL.into(),
            snapshot: calm_snapshot(),
            sector: strong_sector(),
            sector_candidates: vec![leader()],
            daily_bars: breakout_daily(SYMBOL),
            minute_bars: healthy_minutes(SYMBOL),
            quarter_bars: rising_quarters(SYMBOL),
            proposal: TradeProposal {
                entry: Some(13.0),
                stop: Some(12.5),
                target: 14.5,
                equity: 100_000.0,
                pwin: 0.65,
                open_exposure: 0.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::sentry::TradeOutcome;
    use chrono::NaiveDate;

    fn session() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    fn orchestrator() -> Orchestrator {
        let thresholds = ThresholdsConfig::default();
        let sentry = Arc::new(Sentry::new(thresholds.sentry.clone(), session()));
        Orchestrator::new(thresholds, sentry).unwrap()
    }

    fn stages(eval: &Evaluation) -> Vec<Stage> {
        eval.trail.iter().map(|r| r.stage).collect()
    }

    #[test]
    fn test_full_pass_executes() {
        let eval = orchestrator().evaluate(&candidate()).unwrap();
        let Decision::Execute(approval) = &eval.decision else {
            panic!("expected EXECUTE, got {:?}", eval.decision);
        };
        assert_eq!(approval.pattern, PatternKind::Breakout);
        assert_eq!(approval.classification, Classification::FirstLine);
        assert_eq!(approval.size_multiplier, 1.0);
        // raw 2000 capped at 25% of equity: 25000 / 13 -> 1900
        assert_eq!(approval.shares, 1900);
        assert_eq!(
            stages(&eval),
            vec![Stage::Macro, Stage::Rotation, Stage::Selector, Stage::Signal, Stage::Risk, Stage::Sentry]
        );
        assert!(eval.admission.is_none());
    }

    #[test]
    fn test_macro_probe_halves_size() {
        let mut c = candidate();
        c.snapshot.breadth_pct = Some(40.0);
        let eval = orchestrator().evaluate(&c).unwrap();
        let Decision::Probe(approval) = &eval.decision else {
            panic!("expected PROBE, got {:?}", eval.decision);
        };
        assert_eq!(approval.size_multiplier, 0.5);
        assert_eq!(approval.shares, 1000);
    }

    #[test]
    fn test_decay_warning_dampens_size() {
        let mut c = candidate();
        c.sector.day3_turnover = Some(50.0);
        let eval = orchestrator().evaluate(&c).unwrap();
        let Decision::Execute(approval) = &eval.decision else {
            panic!("expected EXECUTE, got {:?}", eval.decision);
        };
        assert_eq!(approval.size_multiplier, 0.5);
        assert_eq!(approval.shares, 1000);
    }

    #[test]
    fn test_macro_block_short_circuits() {
        let mut c = candidate();
        c.snapshot.fear_index = Some(40.0);
        let eval = orchestrator().evaluate(&c).unwrap();
        let rejection = eval.decision.rejection().unwrap();
        assert_eq!(rejection.stage, Stage::Macro);
        assert_eq!(rejection.reason, "macro:fear_index");
        assert_eq!(stages(&eval), vec![Stage::Macro]);
        assert!(eval.sentry.is_none());
    }

    #[test]
    fn test_rotation_failure_names_check() {
        let mut c = candidate();
        c.sector.capital_ratio = Some(0.3);
        let eval = orchestrator().evaluate(&c).unwrap();
        assert_eq!(eval.decision.rejection().unwrap().reason, "rotation:capital_ratio");
    }

    #[test]
    fn test_selector_rejections() {
        let mut c = candidate();
        c.sector_candidates[0].is_st = true;
        let eval = orchestrator().evaluate(&c).unwrap();
        assert_eq!(eval.decision.rejection().unwrap().reason, "selector:avoid_st");

        let mut c = candidate();
        c.sector_candidates.clear();
        let eval = orchestrator().evaluate(&c).unwrap();
        assert_eq!(eval.decision.rejection().unwrap().reason, "selector:not_in_sector");
    }

    fn second_line_member() -> StockCandidate {
        StockCandidate {
            turnover_rank: Some(4),
            rs_rank: None,
            limit_up_time: None,
            distance_ma20: Some(0.05),
            distance_high: Some(0.1),
            net_inflow: Some(0.9),
            ..leader()
        }
    }

    #[test]
    fn test_relative_strength_ranked_from_daily_bars() {
        let mut c = candidate();
        c.sector_candidates = vec![second_line_member()];
        let eval = orchestrator().evaluate(&c).unwrap();
        let approval = eval.decision.approval().expect("approved");
        assert_eq!(approval.classification, Classification::SecondLine);

        // the index outruns the stock over the window
        let mut c = candidate();
        c.sector_candidates = vec![second_line_member()];
        c.snapshot.index_history = (0..50).map(|i| 3000.0 * 1.02_f64.powi(i)).collect();
        c.snapshot.index_close = c.snapshot.index_history.last().copied();
        let eval = orchestrator().evaluate(&c).unwrap();
        let rejection = eval.decision.rejection().unwrap();
        assert_eq!(rejection.reason, "selector:rs_rank");
    }

    #[test]
    fn test_short_bars_reject_at_signal_stage() {
        let mut c = candidate();
        c.daily_bars.truncate(10);
        let eval = orchestrator().evaluate(&c).unwrap();
        let rejection = eval.decision.rejection().unwrap();
        assert_eq!(rejection.reason, "signal:input");
        assert!(rejection.detail.as_deref().unwrap().contains("daily"));
    }

    #[test]
    fn test_risk_rejection() {
        let mut c = candidate();
        c.proposal.target = 13.5;
        let eval = orchestrator().evaluate(&c).unwrap();
        assert_eq!(eval.decision.rejection().unwrap().reason, "risk:rr");

        let mut c = candidate();
        c.proposal.pwin = 2.0;
        let eval = orchestrator().evaluate(&c).unwrap();
        assert_eq!(eval.decision.rejection().unwrap().reason, "risk:input");
    }

    #[test]
    fn test_daily_halt_rejects_until_next_session() {
        let orch = orchestrator();
        orch.sentry()
            .record_outcome(&TradeOutcome {
                pnl_pct: -2.1,
                release_risk_pct: 0.0,
            })
            .unwrap();
        let eval = orch.evaluate(&candidate()).unwrap();
        assert_eq!(eval.decision.rejection().unwrap().reason, "sentry:halt");

        orch.sentry().begin_session(session().succ_opt().unwrap()).unwrap();
        assert_eq!(orch.evaluate(&candidate()).unwrap().decision.label(), "EXECUTE");
    }

    #[test]
    fn test_emotion_forces_probe() {
        let orch = orchestrator();
        for _ in 0..3 {
            orch.sentry()
                .record_outcome(&TradeOutcome {
                    pnl_pct: -0.1,
                    release_risk_pct: 0.0,
                })
                .unwrap();
        }
        let eval = orch.evaluate(&candidate()).unwrap();
        let Decision::Probe(approval) = &eval.decision else {
            panic!("expected PROBE, got {:?}", eval.decision);
        };
        assert_eq!(approval.size_multiplier, 0.5);
    }

    #[test]
    fn test_evaluate_is_pure() {
        let orch = orchestrator();
        let a = orch.evaluate(&candidate()).unwrap();
        let b = orch.evaluate(&candidate()).unwrap();
        assert_eq!(a.decision, b.decision);
        assert_eq!(a.trail, b.trail);
        assert_ne!(a.id, b.id);
        assert_eq!(orch.sentry().snapshot().unwrap().open_risk_pct, 0.0);
    }

    #[test]
    fn test_admit_reserves_then_refuses_over_budget() {
        let orch = orchestrator();
        let first = orch.admit(&candidate()).unwrap();
        assert_eq!(first.decision.label(), "EXECUTE");
        assert!(matches!(first.admission, Some(AdmissionStatus::Admitted { .. })));
        // 1900 * 0.5 + 24700 * 0.3% = 1024.1 on 100k equity
        let open = orch.sentry().snapshot().unwrap().open_risk_pct;
        assert!((open - 1.0241).abs() < 1e-9);

        let second = orch.admit(&candidate()).unwrap();
        assert_eq!(second.decision.rejection().unwrap().reason, "sentry:risk_budget");
    }

    #[test]
    fn test_state_fault_blocks_evaluation() {
        let orch = orchestrator();
        orch.sentry().with_state(|s| s.fault = Some("corrupted".into()));
        assert!(matches!(orch.evaluate(&candidate()), Err(GateError::State(_))));
        assert!(matches!(orch.admit(&candidate()), Err(GateError::State(_))));
    }

    #[test]
    fn test_invalid_thresholds_refuse_construction() {
        let mut thresholds = ThresholdsConfig::default();
        thresholds.risk.lot_size = 0;
        let sentry = Arc::new(Sentry::new(thresholds.sentry.clone(), session()));
        assert!(matches!(
            Orchestrator::new(thresholds, sentry),
            Err(GateError::Config(_))
        ));

        let sentry = Arc::new(Sentry::new(Default::default(), session()));
        let mut thresholds = ThresholdsConfig::default();
        thresholds.sentry.emotion_floor = 0.3;
        assert!(matches!(
            Orchestrator::new(thresholds, sentry),
            Err(GateError::Config(_))
        ));
    }
}
