//! Exit plan: staged take-profits, stops, time exit and the limit-down rule.
//!
//! The plan is fixed at entry. [`ExitPlan::review`] turns it into the next
//! action for an open holding.

use gate_common::config::RiskThresholds;
use serde::{Deserialize, Serialize};

/// One take-profit stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    /// Distance from entry in R (the final target's R is the trade's RR)
    pub r_multiple: f64,
    /// Share of the original position sold at this level
    pub fraction: f64,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub entry: f64,
    pub initial_stop: f64,
    pub target: f64,
    /// entry - initial_stop
    pub r_value: f64,
    /// Staged levels followed by the final target for the remainder
    pub take_profits: Vec<TakeProfitLevel>,
    /// Once the running high reaches this, the stop moves up to entry
    pub soft_break_even: f64,
    pub atr: f64,
    /// Trailing stop = running high - trail_atr_k * ATR
    pub trail_atr_k: f64,
    /// Exit if still below the soft break-even after this many sessions
    pub max_holding_days: u32,
    /// Daily limit used to recognise a limit-down print
    pub price_limit: f64,
}

/// What moved the stop to its current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Initial,
    BreakEven,
    Trailing,
}

/// Next step for an open holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ExitAction {
    /// Limit-down: sell at the best available print, do not wait for stop or target
    EmergencyExit,
    Stop { kind: StopKind, price: f64 },
    /// `stage` is `None` for the final target
    TakeProfit {
        stage: Option<usize>,
        fraction: f64,
        price: f64,
    },
    TimeExit,
    Hold { stop: f64, stop_kind: StopKind },
}

/// Market state of an open holding, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingSnapshot {
    pub last_price: f64,
    /// Current session low
    pub session_low: f64,
    /// Highest high since entry
    pub running_high: f64,
    pub prev_close: f64,
    pub sessions_held: u32,
    /// Staged take-profits already executed
    #[serde(default)]
    pub stages_taken: usize,
}

impl ExitPlan {
    pub fn build(entry: f64, stop: f64, target: f64, atr: f64, t: &RiskThresholds) -> Self {
        let r_value = entry - stop;
        let mut take_profits: Vec<TakeProfitLevel> = t
            .partial_take_profit
            .iter()
            .map(|stage| TakeProfitLevel {
                r_multiple: stage.r_multiple,
                fraction: stage.fraction,
                price: entry + stage.r_multiple * r_value,
            })
            .filter(|level| level.price < target)
            .collect();
        let sold: f64 = take_profits.iter().map(|l| l.fraction).sum();
        take_profits.push(TakeProfitLevel {
            r_multiple: (target - entry) / r_value,
            fraction: (1.0 - sold).max(0.0),
            price: target,
        });

        Self {
            entry,
            initial_stop: stop,
            target,
            r_value,
            take_profits,
            soft_break_even: entry + t.soft_break_even_r * r_value,
            atr,
            trail_atr_k: t.trail_atr_k,
            max_holding_days: t.max_holding_days,
            price_limit: t.price_limit,
        }
    }

    /// Staged levels, excluding the final target.
    pub fn staged(&self) -> &[TakeProfitLevel] {
        &self.take_profits[..self.take_profits.len().saturating_sub(1)]
    }

    /// Stop in force given the running high.
    pub fn effective_stop(&self, running_high: f64) -> (f64, StopKind) {
        let mut stop = (self.initial_stop, StopKind::Initial);
        if running_high >= self.soft_break_even && self.entry > stop.0 {
            stop = (self.entry, StopKind::BreakEven);
        }
        let trailing = running_high - self.trail_atr_k * self.atr;
        if trailing > stop.0 {
            stop = (trailing, StopKind::Trailing);
        }
        stop
    }

    /// Price at which the session is limit-down, rounded to the cent.
    pub fn limit_down_price(&self, prev_close: f64) -> f64 {
        (prev_close * (1.0 - self.price_limit) * 100.0).round() / 100.0
    }

    /// Next action for an open holding, in priority order: limit-down
    /// emergency, stop, final target, next staged take-profit, time exit, hold.
    pub fn review(&self, h: &HoldingSnapshot) -> ExitAction {
        if h.last_price <= self.limit_down_price(h.prev_close) + 1e-9 {
            return ExitAction::EmergencyExit;
        }

        let (stop, stop_kind) = self.effective_stop(h.running_high);
        if h.session_low <= stop {
            return ExitAction::Stop {
                kind: stop_kind,
                price: stop,
            };
        }

        if h.running_high >= self.target {
            let remaining: f64 = self.take_profits[h.stages_taken.min(self.take_profits.len() - 1)..]
                .iter()
                .map(|l| l.fraction)
                .sum();
            return ExitAction::TakeProfit {
                stage: None,
                fraction: remaining,
                price: self.target,
            };
        }

        if let Some(level) = self.staged().get(h.stages_taken) {
            if h.running_high >= level.price {
                return ExitAction::TakeProfit {
                    stage: Some(h.stages_taken),
                    fraction: level.fraction,
                    price: level.price,
                };
            }
        }

        if h.sessions_held >= self.max_holding_days && h.running_high < self.soft_break_even {
            return ExitAction::TimeExit;
        }

        ExitAction::Hold { stop, stop_kind }
    }
}
