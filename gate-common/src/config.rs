//! Configuration management for the gate engine.
//!
//! The engine reads a single configuration file at `~/.sss-gate/config.json`
//! (or the path named by `GATE_CONFIG`).
//!
//! # Configuration Priority
//!
//! 1. Environment variables (GATE_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `GATE_CONFIG` → alternate config file path
//! - `GATE_BIND_ADDRESS` → network.bind
//! - `GATE_PORT` → network.port
//! - `GATE_LOG_LEVEL` → observability.log_level
//! - `GATE_LOG_FORMAT` → observability.log_format
//!
//! # Thresholds
//!
//! Every gate stage owns one typed section under `thresholds`. Sections use
//! `deny_unknown_fields` so that a misspelled knob is a load error instead of
//! a silently defaulted value.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sss-gate"),
        |dirs| dirs.home_dir().join(".sss-gate"),
    )
}

/// Get the configuration file path, honouring `GATE_CONFIG`.
pub fn config_path() -> PathBuf {
    std::env::var("GATE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| config_dir().join("config.json"))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the gate engine service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Network settings for the HTTP wrapper
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Per-stage gate thresholds
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides applied.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("GATE_BIND_ADDRESS") {
            self.network.bind = bind;
        }
        if let Ok(port) = std::env::var("GATE_PORT") {
            match port.parse() {
                Ok(p) => self.network.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring unparsable GATE_PORT"),
            }
        }
        if let Ok(level) = std::env::var("GATE_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Ok(format) = std::env::var("GATE_LOG_FORMAT") {
            self.observability.log_format = format;
        }
    }

    /// Socket address string for the HTTP wrapper.
    pub fn bind_endpoint(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

// ============================================================================
// Network / Observability
// ============================================================================

/// Network configuration for the HTTP wrapper.
///
/// Default bind is `127.0.0.1` (local only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum accepted request body in bytes (bar payloads can be large)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    4460
}

fn default_body_limit() -> usize {
    4 * 1024 * 1024
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to pin at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Gate Thresholds
// ============================================================================

/// All gate thresholds, one section per pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdsConfig {
    #[serde(rename = "macro", alias = "macro_filter")]
    pub macro_filter: MacroThresholds,
    pub rotation: RotationThresholds,
    pub selector: SelectorThresholds,
    pub signal: SignalThresholds,
    pub risk: RiskThresholds,
    pub sentry: SentryThresholds,
}

/// Macro filter thresholds.
///
/// Percent-valued fields use percent units (`-1.5` means -1.5%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MacroThresholds {
    /// Hard: fear index above this blocks trading (default 25)
    pub vix_max: f64,
    /// Hard: global futures change below this blocks trading (default -1.5%)
    pub global_futures_min: f64,
    /// Soft: index must close above its SMA of this many sessions (default 50)
    pub ma_period: usize,
    /// Soft: market breadth floor in percent (default 55)
    pub breadth_min: f64,
    /// Soft: net northbound flow floor (default 0, i.e. no net outflow)
    pub northbound_min: f64,
    /// Soft, optional: overnight index futures change floor in percent
    pub overnight_futures_min: Option<f64>,
    /// Size multiplier for a single soft failure (default 0.5)
    pub probe_multiplier: f64,
}

impl Default for MacroThresholds {
    fn default() -> Self {
        Self {
            vix_max: 25.0,
            global_futures_min: -1.5,
            ma_period: 50,
            breadth_min: 55.0,
            northbound_min: 0.0,
            overnight_futures_min: None,
            probe_multiplier: 0.5,
        }
    }
}

/// Sector rotation thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationThresholds {
    /// Minimum hot-rank improvement (default 5)
    pub rank_change_min: i32,
    /// Turnover-weighted breadth floor in percent (default 60)
    pub breadth_min: f64,
    /// Consecutive leadership days (default 2)
    pub time_continuation_min: u32,
    /// Capital inflow/outflow ratio floor (default 0.5)
    pub capital_ratio_min: f64,
    /// Hidden-fund delta must be strictly above this (default 0)
    pub hidden_fund_min: f64,
    /// Decay warning when day-3 turnover falls below this share of day-1 (default 0.7)
    pub decay_fraction: f64,
}

impl Default for RotationThresholds {
    fn default() -> Self {
        Self {
            rank_change_min: 5,
            breadth_min: 60.0,
            time_continuation_min: 2,
            capital_ratio_min: 0.5,
            hidden_fund_min: 0.0,
            decay_fraction: 0.7,
        }
    }
}

/// Stock selector thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorThresholds {
    /// Leader must rank within the top N by turnover amount (default 2)
    pub top_turnover_n: u32,
    /// Members with this many consecutive limit-ups cannot lead an entry (default 3)
    pub max_consecutive_boards: u32,
    /// Second-line turnover rank band, inclusive (default 3..=8)
    pub second_rank_min: u32,
    pub second_rank_max: u32,
    /// Market cap band in 100M CNY (default 100..=5000)
    pub market_cap_min: f64,
    pub market_cap_max: f64,
    /// P/E tier band (default 0..=60)
    pub pe_min: f64,
    pub pe_max: f64,
    /// Capital footprint floor, strictly above (default 0.5)
    pub footprint_min: f64,
    /// Leader: intraday strength score floor; `None` disables (default 0.8)
    pub strength_score_min: Option<f64>,
    /// Second-line: distance from the 20-day MA as a fraction; `None` disables (default 0.08)
    pub distance_ma20_max: Option<f64>,
    /// Second-line: distance below the recent high as a fraction; `None` disables (default 0.15)
    pub distance_high_max: Option<f64>,
    /// Second-line: net inflow floor in 100M CNY; `None` disables (default 0.5)
    pub net_inflow_min: Option<f64>,
    /// Relative-strength rank floor, strictly above (default 0.75)
    pub rs_rank_min: f64,
    /// Sessions in the RS rank window when it is derived from closes (default 20)
    pub rs_lookback: usize,
    /// Reject stocks listed for this many days or fewer (default 30)
    pub new_stock_days: u32,
    /// Reject ST stocks (default true)
    pub avoid_st: bool,
    /// Reject stocks carrying an external risk flag (default true)
    pub avoid_risk_flag: bool,
}

impl Default for SelectorThresholds {
    fn default() -> Self {
        Self {
            top_turnover_n: 2,
            max_consecutive_boards: 3,
            second_rank_min: 3,
            second_rank_max: 8,
            market_cap_min: 100.0,
            market_cap_max: 5000.0,
            pe_min: 0.0,
            pe_max: 60.0,
            footprint_min: 0.5,
            strength_score_min: Some(0.8),
            distance_ma20_max: Some(0.08),
            distance_high_max: Some(0.15),
            net_inflow_min: Some(0.5),
            rs_rank_min: 0.75,
            rs_lookback: 20,
            new_stock_days: 30,
            avoid_st: true,
            avoid_risk_flag: true,
        }
    }
}

/// Entry signal thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignalThresholds {
    /// Breakout: close must exceed the prior N-day high (default 20)
    pub breakout_lookback: usize,
    /// Breakout: fractional margin over the N-day high (default 0)
    pub breakout_margin: f64,
    /// Volume average window for expansion/contraction tests (default 5)
    pub volume_avg_period: usize,
    /// Breakout: volume multiple of its recent average (default 1.5)
    pub volume_expansion: f64,
    /// Pullback: moving-average support period (default 20)
    pub pullback_ma_period: usize,
    /// Pullback: how close the low must come to support, as a fraction (default 0.02)
    pub pullback_tolerance: f64,
    /// Pullback: bars of retrace measured for volume contraction (default 3)
    pub pullback_window: usize,
    /// Pullback: retrace volume must stay below this share of the average (default 0.8)
    pub volume_contraction: f64,
    /// Continuation: moving averages, shortest first (default 5/10/20)
    pub continuation_ma_periods: Vec<usize>,
    /// Intraday: 1m volume ratio floor (default 1.2)
    pub volume_ratio_min: f64,
    /// Intraday: trailing 1m intervals in the volume average (default 20)
    pub volume_ratio_lookback: usize,
    /// Intraday: OBV/price slope window in 1m bars (default 20)
    pub obv_lookback: usize,
    /// Intraday: consecutive higher-high/higher-low 15m bars (default 3)
    pub structure_bars: usize,
    /// Intraday: 1m moves examined by the anomaly filter (default 30)
    pub anomaly_lookback: usize,
    /// Intraday: standard-deviation multiple marking an anomalous 1m move (default 4)
    pub anomaly_sigma: f64,
    /// ATR period for the suggested stop (default 14)
    pub atr_period: usize,
    /// Suggested stop distance in ATRs (default 1.5)
    pub stop_atr_k: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            breakout_lookback: 20,
            breakout_margin: 0.0,
            volume_avg_period: 5,
            volume_expansion: 1.5,
            pullback_ma_period: 20,
            pullback_tolerance: 0.02,
            pullback_window: 3,
            volume_contraction: 0.8,
            continuation_ma_periods: vec![5, 10, 20],
            volume_ratio_min: 1.2,
            volume_ratio_lookback: 20,
            obv_lookback: 20,
            structure_bars: 3,
            anomaly_lookback: 30,
            anomaly_sigma: 4.0,
            atr_period: 14,
            stop_atr_k: 1.5,
        }
    }
}

/// One staged take-profit: sell `fraction` of the position at `r_multiple` R.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartialTakeProfit {
    pub r_multiple: f64,
    pub fraction: f64,
}

/// Risk gate thresholds.
///
/// Fraction-valued fields use plain fractions (`0.01` means 1%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskThresholds {
    /// Minimum reward/risk ratio (default 2.0)
    pub rr_min: f64,
    /// Minimum calibrated win probability (default 0.60)
    pub pwin_min: f64,
    /// Minimum net expectancy per share, in price units (default 0.006)
    pub ev_net_min: f64,
    /// One-way commission as a fraction (default 0.0005)
    pub fee_rate: f64,
    /// Round-trip slippage as a fraction (default 0.002)
    pub slippage: f64,
    /// Equity risked per trade (default 0.01)
    pub per_trade_risk: f64,
    /// Cap on a single position's notional as a share of equity (default 0.25)
    pub max_position_fraction: f64,
    /// Cap on total open exposure as a share of equity (default 0.8)
    pub max_exposure_fraction: f64,
    /// Board lot (default 100 shares)
    pub lot_size: u64,
    /// Size multiplier applied when the rotation raised a decay warning (default 0.5)
    pub decay_dampening: f64,
    /// Staged take-profits before the final target
    pub partial_take_profit: Vec<PartialTakeProfit>,
    /// Soft break-even level in R (default 0.8)
    pub soft_break_even_r: f64,
    /// Trailing stop distance in ATRs below the running high (default 1.5)
    pub trail_atr_k: f64,
    /// Sessions held before a forced review/exit (default 5)
    pub max_holding_days: u32,
    /// Daily price limit used for the limit-down emergency rule (default 0.10)
    pub price_limit: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            rr_min: 2.0,
            pwin_min: 0.60,
            ev_net_min: 0.006,
            fee_rate: 0.0005,
            slippage: 0.002,
            per_trade_risk: 0.01,
            max_position_fraction: 0.25,
            max_exposure_fraction: 0.8,
            lot_size: 100,
            decay_dampening: 0.5,
            partial_take_profit: vec![PartialTakeProfit {
                r_multiple: 1.0,
                fraction: 0.5,
            }],
            soft_break_even_r: 0.8,
            trail_atr_k: 1.5,
            max_holding_days: 5,
            price_limit: 0.10,
        }
    }
}

impl RiskThresholds {
    /// Round-trip cost fraction: commission both ways plus slippage.
    pub fn round_trip_cost(&self) -> f64 {
        self.fee_rate * 2.0 + self.slippage
    }
}

/// Sentry (circuit breaker) thresholds.
///
/// Loss limits use percent units (`-2.0` means -2% of equity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SentryThresholds {
    /// Session PnL at or below this halts new admissions for the day (default -2%)
    pub daily_loss_limit_pct: f64,
    /// Monthly drawdown at or below this halts until operator reset (default -5%)
    pub monthly_drawdown_limit_pct: f64,
    /// Emotion score below this forces probe-only sizing (default 0.6)
    pub emotion_floor: f64,
    /// Emotion penalty per loss, multiplied by the current losing streak (default 0.1)
    pub loss_step: f64,
    /// Emotion recovery per winning close (default 0.05)
    pub win_step: f64,
    /// Emotion recovery at each session boundary (default 0.2)
    pub session_recovery: f64,
    /// Size multiplier when emotion forces probing (default 0.5)
    pub probe_multiplier: f64,
}

impl Default for SentryThresholds {
    fn default() -> Self {
        Self {
            daily_loss_limit_pct: -2.0,
            monthly_drawdown_limit_pct: -5.0,
            emotion_floor: 0.6,
            loss_step: 0.1,
            win_step: 0.05,
            session_recovery: 0.2,
            probe_multiplier: 0.5,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
