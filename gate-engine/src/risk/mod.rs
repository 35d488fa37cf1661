//! Risk gate: RR / Pwin / EV_net, position sizing and the exit plan.
//!
//! # Gates
//!
//! - RR = (target - entry) / (entry - stop), must reach `rr_min`
//! - Pwin (externally calibrated) must reach `pwin_min`
//! - EV_net = Pwin * (target - entry) - (1 - Pwin) * (entry - stop) - round-trip cost,
//!   must reach `ev_net_min`
//!
//! EV_net is per share in price units (CNY): the two distances are prices
//! while the round-trip cost is the bare fee-plus-slippage fraction. The same
//! `ev_net_min` is therefore stricter for cheap shares than for expensive
//! ones; tune it for the price range being traded.
//!
//! A stop at or above entry is a rejection, never a division.
//!
//! # Sizing
//!
//! `floor(equity * per_trade_risk / (entry - stop))` shares, scaled by the
//! upstream size multiplier, rounded down to the board lot, then clamped by the
//! per-position cap and by the remaining portfolio exposure. Zero shares after
//! clamping is a rejection.

pub mod exit_plan;

pub use exit_plan::{ExitAction, ExitPlan, HoldingSnapshot, StopKind, TakeProfitLevel};

use gate_common::config::RiskThresholds;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};
use crate::signal::EntrySignal;

/// Trade parameters proposed for a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRequest {
    pub entry: f64,
    /// Falls back to the signal's ATR stop when absent
    #[serde(default)]
    pub stop: Option<f64>,
    pub target: f64,
    pub equity: f64,
    /// Calibrated win probability in [0, 1]
    pub pwin: f64,
    /// Notional of positions already open
    #[serde(default)]
    pub open_exposure: f64,
    /// Product of upstream dampening (probe, decay); 1.0 for full size
    #[serde(default = "default_multiplier")]
    pub size_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskVerdict {
    Pass,
    Reject,
}

/// One of the three sub-gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGate {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    /// Shares before multiplier, lot rounding and clamps
    pub raw_shares: u64,
    pub shares: u64,
    pub notional: f64,
    /// Equity put at risk by the per-trade rule
    pub risk_amount: f64,
    /// Loss at the stop including round-trip cost
    pub max_loss: f64,
    /// Which cap bound the size, if any
    pub clamped_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskGateResult {
    pub symbol: String,
    pub verdict: RiskVerdict,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
    /// `None` when the stop is not below entry
    pub rr: Option<f64>,
    pub pwin: f64,
    pub ev_net: Option<f64>,
    pub gates: Vec<SubGate>,
    pub position: Option<PositionSize>,
    pub exit_plan: Option<ExitPlan>,
    /// Failing condition on rejection
    pub reason: Option<String>,
}

impl RiskGateResult {
    pub fn passed(&self) -> bool {
        self.verdict == RiskVerdict::Pass
    }

    fn reject(mut self, reason: &str) -> Self {
        self.verdict = RiskVerdict::Reject;
        self.reason = Some(reason.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct RiskGate {
    thresholds: RiskThresholds,
}

impl RiskGate {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// `EvaluateRisk`. Malformed inputs are an input error; every other
    /// failure is a `Reject` verdict with a reason.
    pub fn evaluate(&self, signal: &EntrySignal, req: &RiskRequest) -> GateResult<RiskGateResult> {
        let t = &self.thresholds;
        let stop = req.stop.unwrap_or(signal.suggested_stop);
        validate_request(req, stop)?;

        let mut result = RiskGateResult {
            symbol: signal.symbol.clone(),
            verdict: RiskVerdict::Pass,
            entry: req.entry,
            stop,
            target: req.target,
            rr: None,
            pwin: req.pwin,
            ev_net: None,
            gates: Vec::new(),
            position: None,
            exit_plan: None,
            reason: None,
        };

        let risk_per_share = req.entry - stop;
        if risk_per_share <= 0.0 {
            tracing::info!(symbol = %signal.symbol, entry = req.entry, stop, "Stop not below entry, rejecting");
            return Ok(result.reject("stop_not_below_entry"));
        }

        let reward = req.target - req.entry;
        let rr = reward / risk_per_share;
        let ev_net = req.pwin * reward - (1.0 - req.pwin) * risk_per_share - t.round_trip_cost();
        result.rr = Some(rr);
        result.ev_net = Some(ev_net);
        result.gates = vec![
            SubGate {
                name: "rr".into(),
                value: rr,
                min: t.rr_min,
                passed: rr + 1e-9 >= t.rr_min,
            },
            SubGate {
                name: "pwin".into(),
                value: req.pwin,
                min: t.pwin_min,
                passed: req.pwin >= t.pwin_min,
            },
            SubGate {
                name: "ev_net".into(),
                value: ev_net,
                min: t.ev_net_min,
                passed: ev_net >= t.ev_net_min,
            },
        ];

        if let Some(failed) = result.gates.iter().find(|g| !g.passed) {
            let reason = failed.name.clone();
            tracing::info!(
                symbol = %signal.symbol,
                gate = %reason,
                value = failed.value,
                min = failed.min,
                "Risk sub-gate failed"
            );
            return Ok(result.reject(&reason));
        }

        let position = self.size(req, risk_per_share);
        tracing::debug!(
            symbol = %signal.symbol,
            raw = position.raw_shares,
            shares = position.shares,
            clamped_by = ?position.clamped_by,
            "Position sized"
        );
        if position.shares == 0 {
            result.position = Some(position);
            return Ok(result.reject("size_zero"));
        }

        result.exit_plan = Some(ExitPlan::build(req.entry, stop, req.target, signal.atr, t));
        result.position = Some(position);
        tracing::info!(
            symbol = %signal.symbol,
            rr,
            pwin = req.pwin,
            ev_net,
            "Risk gate passed"
        );
        Ok(result)
    }

    fn size(&self, req: &RiskRequest, risk_per_share: f64) -> PositionSize {
        let t = &self.thresholds;
        let lot = t.lot_size;
        let to_lots = |shares: f64| -> u64 {
            if shares.is_finite() && shares > 0.0 {
                (shares.floor() as u64 / lot) * lot
            } else {
                0
            }
        };

        let risk_amount = req.equity * t.per_trade_risk;
        let raw_shares = (risk_amount / risk_per_share).floor().max(0.0) as u64;
        let mut shares = to_lots(raw_shares as f64 * req.size_multiplier);
        let mut clamped_by = None;

        let position_cap = to_lots(req.equity * t.max_position_fraction / req.entry);
        if shares > position_cap {
            shares = position_cap;
            clamped_by = Some("max_position".to_string());
        }

        let headroom = t.max_exposure_fraction * req.equity - req.open_exposure;
        let exposure_cap = to_lots(headroom / req.entry);
        if shares > exposure_cap {
            shares = exposure_cap;
            clamped_by = Some("max_exposure".to_string());
        }

        let notional = shares as f64 * req.entry;
        PositionSize {
            raw_shares,
            shares,
            notional,
            risk_amount,
            max_loss: shares as f64 * risk_per_share + notional * self.thresholds.round_trip_cost(),
            clamped_by,
        }
    }
}

fn validate_request(req: &RiskRequest, stop: f64) -> GateResult<()> {
    let fields = [
        ("entry", req.entry),
        ("stop", stop),
        ("target", req.target),
        ("equity", req.equity),
        ("pwin", req.pwin),
        ("open_exposure", req.open_exposure),
        ("size_multiplier", req.size_multiplier),
    ];
    if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
        return Err(GateError::input(format!("{name} is not finite ({value})")));
    }
    if req.entry <= 0.0 {
        return Err(GateError::input("entry must be positive"));
    }
    if req.equity <= 0.0 {
        return Err(GateError::input("equity must be positive"));
    }
    if !(0.0..=1.0).contains(&req.pwin) {
        return Err(GateError::input(format!("pwin {} outside [0, 1]", req.pwin)));
    }
    if req.open_exposure < 0.0 {
        return Err(GateError::input("open_exposure must not be negative"));
    }
    if !(0.0..=1.0).contains(&req.size_multiplier) {
        return Err(GateError::input("size_multiplier outside [0, 1]"));
    }
    Ok(())
}
