//! Sentry: the session circuit breaker.
//!
//! # States
//!
//! ```text
//!            daily pnl <= daily limit
//! ┌────────┐ ────────────────────────► ┌────────────┐
//! │ NORMAL │                           │ DAILY_HALT │
//! └────────┘ ◄──────────────────────── └────────────┘
//!     │          next session               │
//!     │                                     │
//!     │   monthly drawdown <= monthly limit │
//!     ▼                                     ▼
//! ┌──────────────────────────────────────────────┐
//! │ MONTHLY_HALT (clears on operator reset only) │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The emotion score drops with each losing close (faster on a streak) and
//! recovers with wins and session boundaries. Below the floor it forces PROBE
//! sizing without changing the state.
//!
//! [`SentrySessionState`] holds the pure transitions. [`Sentry`] is the shared
//! handle: one `Mutex`, so checks, admissions and outcomes are linearized.
//! A state fault (broken invariant or poisoned lock) is latched and refuses
//! every call until [`Sentry::operator_reset`].
//!
//! Reserved risk is not a per-session figure. Under T+1 an admitted position
//! is held at least overnight, so its reservation carries across session
//! boundaries until its outcome (or an operator reset) releases it.
//!
//! Sessions advance through [`Sentry::begin_session`] or
//! [`Sentry::roll_forward`]; the service binary calls the latter on a timer
//! with the exchange-local date.

use std::sync::{Mutex, MutexGuard};

use chrono::{Datelike, NaiveDate};
use gate_common::config::SentryThresholds;
use serde::{Deserialize, Serialize};

use crate::error::{GateError, GateResult};

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentryState {
    Normal,
    DailyHalt,
    MonthlyHalt,
}

impl SentryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::DailyHalt => "DAILY_HALT",
            Self::MonthlyHalt => "MONTHLY_HALT",
        }
    }
}

impl std::fmt::Display for SentryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-scoped risk record. All PnL and risk figures are percent of equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentrySessionState {
    pub session_date: NaiveDate,
    /// Realized PnL since the session began
    pub daily_pnl_pct: f64,
    /// Realized PnL since the month began
    pub monthly_pnl_pct: f64,
    /// High-water mark of `monthly_pnl_pct`
    pub monthly_peak_pct: f64,
    /// 1.0 is calm; below the configured floor forces PROBE
    pub emotion_score: f64,
    pub consecutive_losses: u32,
    /// Risk reserved by admitted trades that have not closed
    pub open_risk_pct: f64,
    pub state: SentryState,
    /// Latched state fault
    pub fault: Option<String>,
}

/// Result of `Sentry.Check`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentryCheck {
    pub state: SentryState,
    pub force_probe: bool,
    /// Sizing cap the sentry imposes: 1.0, or the probe multiplier when forced
    pub size_multiplier: f64,
    pub emotion_score: f64,
    pub daily_pnl_pct: f64,
    pub monthly_drawdown_pct: f64,
    pub open_risk_pct: f64,
}

impl SentryCheck {
    pub fn halted(&self) -> bool {
        self.state != SentryState::Normal
    }
}

/// A closed (or partially closed) trade reported back to the sentry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    /// Realized PnL, percent of equity
    pub pnl_pct: f64,
    /// Reserved risk freed by the close
    #[serde(default)]
    pub release_risk_pct: f64,
}

impl SentrySessionState {
    pub fn new(session_date: NaiveDate) -> Self {
        Self {
            session_date,
            daily_pnl_pct: 0.0,
            monthly_pnl_pct: 0.0,
            monthly_peak_pct: 0.0,
            emotion_score: 1.0,
            consecutive_losses: 0,
            open_risk_pct: 0.0,
            state: SentryState::Normal,
            fault: None,
        }
    }

    pub fn monthly_drawdown_pct(&self) -> f64 {
        self.monthly_pnl_pct - self.monthly_peak_pct
    }

    /// `Sentry.Check`: read-only.
    pub fn check(&self, t: &SentryThresholds) -> GateResult<SentryCheck> {
        self.ensure_healthy()?;
        let force_probe = self.emotion_score < t.emotion_floor;
        Ok(SentryCheck {
            state: self.state,
            force_probe,
            size_multiplier: if force_probe { t.probe_multiplier } else { 1.0 },
            emotion_score: self.emotion_score,
            daily_pnl_pct: self.daily_pnl_pct,
            monthly_drawdown_pct: self.monthly_drawdown_pct(),
            open_risk_pct: self.open_risk_pct,
        })
    }

    /// `Sentry.RecordOutcome`: fold a realized PnL into the session and month.
    pub fn record_outcome(&mut self, outcome: &TradeOutcome, t: &SentryThresholds) -> GateResult<SentryState> {
        self.ensure_healthy()?;
        if !outcome.pnl_pct.is_finite() || !outcome.release_risk_pct.is_finite() || outcome.release_risk_pct < 0.0 {
            return Err(GateError::input(format!("invalid trade outcome {outcome:?}")));
        }

        self.release_risk(outcome.release_risk_pct);
        self.daily_pnl_pct += outcome.pnl_pct;
        self.monthly_pnl_pct += outcome.pnl_pct;
        self.monthly_peak_pct = self.monthly_peak_pct.max(self.monthly_pnl_pct);

        if outcome.pnl_pct < 0.0 {
            self.consecutive_losses += 1;
            self.emotion_score -= t.loss_step * self.consecutive_losses as f64;
        } else if outcome.pnl_pct > 0.0 {
            self.consecutive_losses = 0;
            self.emotion_score += t.win_step;
        }
        self.emotion_score = self.emotion_score.clamp(0.0, 1.0);

        self.apply_limits(t);
        self.verify()?;
        Ok(self.state)
    }

    /// Roll to a new session. A DAILY_HALT clears; a new month resets the
    /// monthly counters but never a MONTHLY_HALT. Open risk carries over:
    /// T+1 positions stay exposed until their outcome releases them.
    pub fn begin_session(&mut self, date: NaiveDate, t: &SentryThresholds) -> GateResult<SentryState> {
        self.ensure_healthy()?;
        if date < self.session_date {
            return Err(GateError::input(format!(
                "session {date} precedes current session {}",
                self.session_date
            )));
        }
        if date == self.session_date {
            return Ok(self.state);
        }

        if (date.year(), date.month()) != (self.session_date.year(), self.session_date.month()) {
            self.monthly_pnl_pct = 0.0;
            self.monthly_peak_pct = 0.0;
        }
        self.session_date = date;
        self.daily_pnl_pct = 0.0;
        self.emotion_score = (self.emotion_score + t.session_recovery).clamp(0.0, 1.0);
        if self.state == SentryState::DailyHalt {
            self.state = SentryState::Normal;
        }
        self.verify()?;
        Ok(self.state)
    }

    /// Whether `risk_pct` more open risk keeps the worst case within the daily limit.
    pub fn has_budget(&self, risk_pct: f64, t: &SentryThresholds) -> bool {
        self.daily_pnl_pct - self.open_risk_pct - risk_pct >= t.daily_loss_limit_pct
    }

    pub fn reserve_risk(&mut self, risk_pct: f64) {
        self.open_risk_pct += risk_pct;
    }

    pub fn release_risk(&mut self, risk_pct: f64) {
        self.open_risk_pct = (self.open_risk_pct - risk_pct).max(0.0);
    }

    /// Human-reviewed reset: clears every halt, fault and counter.
    pub fn operator_reset(&mut self, date: NaiveDate) {
        *self = Self::new(date);
    }

    fn apply_limits(&mut self, t: &SentryThresholds) {
        if self.state != SentryState::MonthlyHalt && self.monthly_drawdown_pct() <= t.monthly_drawdown_limit_pct {
            self.state = SentryState::MonthlyHalt;
        } else if self.state == SentryState::Normal && self.daily_pnl_pct <= t.daily_loss_limit_pct {
            self.state = SentryState::DailyHalt;
        }
    }

    fn ensure_healthy(&self) -> GateResult<()> {
        match &self.fault {
            Some(fault) => Err(GateError::state(fault.clone())),
            None => Ok(()),
        }
    }

    /// Latch a fault if an invariant no longer holds.
    fn verify(&mut self) -> GateResult<()> {
        let numbers = [
            self.daily_pnl_pct,
            self.monthly_pnl_pct,
            self.monthly_peak_pct,
            self.emotion_score,
            self.open_risk_pct,
        ];
        let fault = if numbers.iter().any(|v| !v.is_finite()) {
            Some("non-finite sentry figure")
        } else if !(0.0..=1.0).contains(&self.emotion_score) {
            Some("emotion score out of range")
        } else if self.open_risk_pct < 0.0 {
            Some("negative open risk")
        } else if self.monthly_peak_pct < self.monthly_pnl_pct {
            Some("monthly peak below monthly pnl")
        } else {
            None
        };
        match fault {
            Some(reason) => {
                self.latch(reason);
                Err(GateError::state(reason))
            }
            None => Ok(()),
        }
    }

    fn latch(&mut self, reason: &str) {
        tracing::error!(fault = %reason, "Sentry state fault latched");
        self.fault = Some(reason.to_string());
    }
}

// ============================================================================
// Shared handle
// ============================================================================

/// Outcome of a check-and-reserve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdmissionStatus {
    Admitted { reserved_pct: f64 },
    Halted,
    OverBudget { requested_pct: f64 },
    /// The plan produced no position to reserve for
    NotRequested,
}

/// What [`Sentry::try_admit`] decided, plus the caller's plan output.
#[derive(Debug, Clone)]
pub struct Admission<T> {
    pub check: SentryCheck,
    pub outcome: T,
    pub status: AdmissionStatus,
}

/// Mutex-guarded sentry shared by every evaluation.
#[derive(Debug)]
pub struct Sentry {
    thresholds: SentryThresholds,
    state: Mutex<SentrySessionState>,
}

impl Sentry {
    pub fn new(thresholds: SentryThresholds, session_date: NaiveDate) -> Self {
        Self {
            thresholds,
            state: Mutex::new(SentrySessionState::new(session_date)),
        }
    }

    pub fn thresholds(&self) -> &SentryThresholds {
        &self.thresholds
    }

    fn lock(&self) -> GateResult<MutexGuard<'_, SentrySessionState>> {
        match self.state.lock() {
            Ok(guard) => Ok(guard),
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                if guard.fault.is_none() {
                    guard.latch("sentry lock poisoned");
                }
                Err(GateError::state("sentry lock poisoned"))
            }
        }
    }

    pub fn check(&self) -> GateResult<SentryCheck> {
        self.lock()?.check(&self.thresholds)
    }

    pub fn snapshot(&self) -> GateResult<SentrySessionState> {
        Ok(self.lock()?.clone())
    }

    pub fn record_outcome(&self, outcome: &TradeOutcome) -> GateResult<SentryState> {
        let mut state = self.lock()?;
        let before = state.state;
        let after = state.record_outcome(outcome, &self.thresholds)?;
        if after != before {
            tracing::warn!(
                from = %before,
                to = %after,
                daily_pnl_pct = state.daily_pnl_pct,
                monthly_drawdown_pct = state.monthly_drawdown_pct(),
                "Sentry halted"
            );
        } else {
            tracing::info!(
                pnl_pct = outcome.pnl_pct,
                daily_pnl_pct = state.daily_pnl_pct,
                emotion = state.emotion_score,
                "Trade outcome recorded"
            );
        }
        Ok(after)
    }

    pub fn begin_session(&self, date: NaiveDate) -> GateResult<SentryState> {
        let mut state = self.lock()?;
        let before = state.state;
        let after = state.begin_session(date, &self.thresholds)?;
        tracing::info!(session = %date, from = %before, to = %after, "Session boundary");
        Ok(after)
    }

    /// Open `date` as the new session if it is later than the current one.
    /// Returns the resulting state, or `None` when no boundary was crossed.
    pub fn roll_forward(&self, date: NaiveDate) -> GateResult<Option<SentryState>> {
        let mut state = self.lock()?;
        if date <= state.session_date {
            return Ok(None);
        }
        let before = state.state;
        let after = state.begin_session(date, &self.thresholds)?;
        tracing::info!(session = %date, from = %before, to = %after, "Session rolled over");
        Ok(Some(after))
    }

    /// Check, plan and reserve under one lock.
    ///
    /// `plan` receives the sentry check and returns its output plus the risk
    /// (percent of equity) it wants to reserve, or `None` when there is
    /// nothing to reserve.
    pub fn try_admit<T>(
        &self,
        plan: impl FnOnce(&SentryCheck) -> (T, Option<f64>),
    ) -> GateResult<Admission<T>> {
        let mut state = self.lock()?;
        let check = state.check(&self.thresholds)?;
        let (outcome, risk_pct) = plan(&check);

        let status = match risk_pct {
            None => AdmissionStatus::NotRequested,
            Some(risk) if !risk.is_finite() || risk < 0.0 => {
                return Err(GateError::input(format!("invalid risk reservation {risk}")));
            }
            Some(_) if check.halted() => AdmissionStatus::Halted,
            Some(risk) if !state.has_budget(risk, &self.thresholds) => {
                tracing::info!(
                    requested_pct = risk,
                    open_risk_pct = state.open_risk_pct,
                    daily_pnl_pct = state.daily_pnl_pct,
                    "Admission exceeds daily risk budget"
                );
                AdmissionStatus::OverBudget { requested_pct: risk }
            }
            Some(risk) => {
                state.reserve_risk(risk);
                state.verify()?;
                AdmissionStatus::Admitted { reserved_pct: risk }
            }
        };
        Ok(Admission { check, outcome, status })
    }

    pub fn release_risk(&self, risk_pct: f64) -> GateResult<()> {
        if !risk_pct.is_finite() || risk_pct < 0.0 {
            return Err(GateError::input(format!("invalid risk release {risk_pct}")));
        }
        let mut state = self.lock()?;
        state.ensure_healthy()?;
        state.release_risk(risk_pct);
        Ok(())
    }

    /// Clear every halt and latched fault, including a poisoned lock.
    pub fn operator_reset(&self, date: NaiveDate) -> SentrySessionState {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                self.state.clear_poison();
                poisoned.into_inner()
            }
        };
        let previous = state.state;
        state.operator_reset(date);
        tracing::warn!(from = %previous, session = %date, "Sentry reset by operator");
        state.clone()
    }

    #[cfg(test)]
    pub(crate) fn with_state(&self, f: impl FnOnce(&mut SentrySessionState)) {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard);
    }
}

// ============================================================================
// Tests
// ============================================================================
