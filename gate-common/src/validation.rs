//! Configuration validation for the gate engine.
//!
//! Thresholds are loaded once and reused for every evaluation, so they are
//! checked here, at construction time, rather than per call.

use thiserror::Error;

use crate::config::{
    Config, MacroThresholds, NetworkConfig, ObservabilityConfig, RiskThresholds,
    RotationThresholds, SelectorThresholds, SentryThresholds, SignalThresholds, ThresholdsConfig,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Fold a list of section errors into a single result.
fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.remove(0))
    } else {
        Err(ValidationError::Multiple(errors))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}

fn finite(field: &str, value: f64, errors: &mut Vec<ValidationError>) {
    if !value.is_finite() {
        errors.push(invalid(field, "must be a finite number"));
    }
}

fn fraction(field: &str, value: f64, errors: &mut Vec<ValidationError>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(invalid(field, format!("must lie in [0, 1], got {value}")));
    }
}

fn positive_fraction(field: &str, value: f64, errors: &mut Vec<ValidationError>) {
    if !(value > 0.0 && value <= 1.0) {
        errors.push(invalid(field, format!("must lie in (0, 1], got {value}")));
    }
}

fn positive(field: &str, value: f64, errors: &mut Vec<ValidationError>) {
    if !(value > 0.0 && value.is_finite()) {
        errors.push(invalid(field, format!("must be positive, got {value}")));
    }
}

fn nonzero(field: &str, value: usize, errors: &mut Vec<ValidationError>) {
    if value == 0 {
        errors.push(invalid(field, "must be at least 1"));
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.network.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }
        if let Err(e) = self.thresholds.validate() {
            errors.push(e);
        }

        collect(errors)
    }
}

impl Validate for NetworkConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "network.port".into(),
            });
        }
        if self.bind.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.log_format.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            });
        }

        Ok(())
    }
}

impl Validate for ThresholdsConfig {
    fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 6] = [
            &self.macro_filter,
            &self.rotation,
            &self.selector,
            &self.signal,
            &self.risk,
            &self.sentry,
        ];
        collect(
            sections
                .iter()
                .filter_map(|section| section.validate().err())
                .collect(),
        )
    }
}

impl Validate for MacroThresholds {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        finite("macro.vix_max", self.vix_max, &mut errors);
        finite("macro.global_futures_min", self.global_futures_min, &mut errors);
        finite("macro.breadth_min", self.breadth_min, &mut errors);
        finite("macro.northbound_min", self.northbound_min, &mut errors);
        if let Some(min) = self.overnight_futures_min {
            finite("macro.overnight_futures_min", min, &mut errors);
        }
        nonzero("macro.ma_period", self.ma_period, &mut errors);
        positive_fraction("macro.probe_multiplier", self.probe_multiplier, &mut errors);
        collect(errors)
    }
}

impl Validate for RotationThresholds {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        finite("rotation.breadth_min", self.breadth_min, &mut errors);
        finite("rotation.capital_ratio_min", self.capital_ratio_min, &mut errors);
        finite("rotation.hidden_fund_min", self.hidden_fund_min, &mut errors);
        positive_fraction("rotation.decay_fraction", self.decay_fraction, &mut errors);
        collect(errors)
    }
}

impl Validate for SelectorThresholds {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.top_turnover_n == 0 {
            errors.push(invalid("selector.top_turnover_n", "must be at least 1"));
        }
        if self.max_consecutive_boards == 0 {
            errors.push(invalid("selector.max_consecutive_boards", "must be at least 1"));
        }
        if self.second_rank_min > self.second_rank_max {
            errors.push(ValidationError::Conflict {
                reason: format!(
                    "selector.second_rank_min ({}) exceeds second_rank_max ({})",
                    self.second_rank_min, self.second_rank_max
                ),
            });
        }
        if self.second_rank_min <= self.top_turnover_n {
            errors.push(ValidationError::Conflict {
                reason: "selector second-line rank band overlaps the leader band".into(),
            });
        }
        if !(self.market_cap_min <= self.market_cap_max) {
            errors.push(ValidationError::Conflict {
                reason: "selector.market_cap_min exceeds market_cap_max".into(),
            });
        }
        if !(self.pe_min <= self.pe_max) {
            errors.push(ValidationError::Conflict {
                reason: "selector.pe_min exceeds pe_max".into(),
            });
        }
        finite("selector.footprint_min", self.footprint_min, &mut errors);
        if let Some(min) = self.strength_score_min {
            fraction("selector.strength_score_min", min, &mut errors);
        }
        if let Some(max) = self.distance_ma20_max {
            positive("selector.distance_ma20_max", max, &mut errors);
        }
        if let Some(max) = self.distance_high_max {
            positive("selector.distance_high_max", max, &mut errors);
        }
        if let Some(min) = self.net_inflow_min {
            finite("selector.net_inflow_min", min, &mut errors);
        }
        fraction("selector.rs_rank_min", self.rs_rank_min, &mut errors);
        nonzero("selector.rs_lookback", self.rs_lookback, &mut errors);
        collect(errors)
    }
}

impl Validate for SignalThresholds {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        nonzero("signal.breakout_lookback", self.breakout_lookback, &mut errors);
        nonzero("signal.volume_avg_period", self.volume_avg_period, &mut errors);
        nonzero("signal.pullback_ma_period", self.pullback_ma_period, &mut errors);
        nonzero("signal.pullback_window", self.pullback_window, &mut errors);
        nonzero("signal.volume_ratio_lookback", self.volume_ratio_lookback, &mut errors);
        nonzero("signal.structure_bars", self.structure_bars, &mut errors);
        nonzero("signal.atr_period", self.atr_period, &mut errors);
        if self.obv_lookback < 2 {
            errors.push(invalid("signal.obv_lookback", "must be at least 2"));
        }
        if self.anomaly_lookback < 3 {
            errors.push(invalid("signal.anomaly_lookback", "must be at least 3"));
        }
        if self.breakout_margin < 0.0 || !self.breakout_margin.is_finite() {
            errors.push(invalid("signal.breakout_margin", "must be non-negative"));
        }
        positive("signal.volume_expansion", self.volume_expansion, &mut errors);
        positive("signal.volume_contraction", self.volume_contraction, &mut errors);
        positive("signal.volume_ratio_min", self.volume_ratio_min, &mut errors);
        positive("signal.anomaly_sigma", self.anomaly_sigma, &mut errors);
        positive("signal.stop_atr_k", self.stop_atr_k, &mut errors);
        fraction("signal.pullback_tolerance", self.pullback_tolerance, &mut errors);

        let periods = &self.continuation_ma_periods;
        if periods.len() < 2 {
            errors.push(invalid(
                "signal.continuation_ma_periods",
                "needs at least two moving averages",
            ));
        } else if periods.contains(&0) || periods.windows(2).any(|w| w[0] >= w[1]) {
            errors.push(invalid(
                "signal.continuation_ma_periods",
                "must be strictly increasing, shortest first",
            ));
        }
        collect(errors)
    }
}

impl Validate for RiskThresholds {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        positive("risk.rr_min", self.rr_min, &mut errors);
        fraction("risk.pwin_min", self.pwin_min, &mut errors);
        finite("risk.ev_net_min", self.ev_net_min, &mut errors);
        fraction("risk.fee_rate", self.fee_rate, &mut errors);
        fraction("risk.slippage", self.slippage, &mut errors);
        positive_fraction("risk.per_trade_risk", self.per_trade_risk, &mut errors);
        positive_fraction("risk.max_position_fraction", self.max_position_fraction, &mut errors);
        positive_fraction("risk.max_exposure_fraction", self.max_exposure_fraction, &mut errors);
        positive_fraction("risk.decay_dampening", self.decay_dampening, &mut errors);
        positive_fraction("risk.price_limit", self.price_limit, &mut errors);
        positive("risk.trail_atr_k", self.trail_atr_k, &mut errors);
        finite("risk.soft_break_even_r", self.soft_break_even_r, &mut errors);
        if self.lot_size == 0 {
            errors.push(invalid("risk.lot_size", "must be at least 1"));
        }
        if self.max_holding_days == 0 {
            errors.push(invalid("risk.max_holding_days", "must be at least 1"));
        }

        let mut sold = 0.0;
        for (i, stage) in self.partial_take_profit.iter().enumerate() {
            let field = format!("risk.partial_take_profit[{i}]");
            positive(&field, stage.r_multiple, &mut errors);
            positive_fraction(&field, stage.fraction, &mut errors);
            sold += stage.fraction;
        }
        if sold > 1.0 + 1e-9 {
            errors.push(invalid(
                "risk.partial_take_profit",
                format!("staged fractions sum to {sold:.3}, above 1"),
            ));
        }
        collect(errors)
    }
}

impl Validate for SentryThresholds {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if !(self.daily_loss_limit_pct < 0.0) {
            errors.push(invalid("sentry.daily_loss_limit_pct", "must be negative"));
        }
        if !(self.monthly_drawdown_limit_pct < 0.0) {
            errors.push(invalid("sentry.monthly_drawdown_limit_pct", "must be negative"));
        }
        fraction("sentry.emotion_floor", self.emotion_floor, &mut errors);
        fraction("sentry.loss_step", self.loss_step, &mut errors);
        fraction("sentry.win_step", self.win_step, &mut errors);
        fraction("sentry.session_recovery", self.session_recovery, &mut errors);
        positive_fraction("sentry.probe_multiplier", self.probe_multiplier, &mut errors);
        collect(errors)
    }
}
