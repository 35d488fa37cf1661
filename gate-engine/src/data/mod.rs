//! Market data records consumed by the gate pipeline.
//!
//! Everything here is produced by the external data layer and read-only to the
//! gates. Snapshot, sector and candidate fields are `Option` so that a missing
//! upstream value stays visible: every gate treats `None` as a failing check.
//!
//! - [`provider`]: the `GetOHLCV` contract and an in-memory implementation
//! - [`normalize`]: boundary adaptation of loosely-shaped upstream bars

pub mod normalize;
mod provider;

pub use provider::{AdjustMethod, InMemoryProvider, OhlcvProvider, ProviderError};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Bars
// ============================================================================

/// Bar interval used by the signal generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// 1-minute bars (volume ratio, OBV, anomaly filter)
    M1,
    /// 15-minute bars (intraday structure)
    M15,
    /// Daily bars (pattern detection, ATR)
    Daily,
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::M1 => write!(f, "1M"),
            Self::M15 => write!(f, "15M"),
            Self::Daily => write!(f, "D"),
        }
    }
}

/// A single OHLCV bar, adjusted by the data layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub symbol: String,
    /// Bar open time
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// Close below open ("yin" bar).
    pub fn is_down(&self) -> bool {
        self.close < self.open
    }

    /// Absolute body size.
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    /// Full range (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Market-wide snapshot evaluated by the macro filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub as_of: DateTime<Utc>,
    /// VIX-equivalent fear index
    #[serde(default)]
    pub fear_index: Option<f64>,
    /// Global futures change in percent
    #[serde(default)]
    pub global_futures_pct: Option<f64>,
    /// Overnight index futures change in percent
    #[serde(default)]
    pub overnight_futures_pct: Option<f64>,
    /// Latest index close
    #[serde(default)]
    pub index_close: Option<f64>,
    /// Index closes, oldest first, used for the moving-average test
    #[serde(default)]
    pub index_history: Vec<f64>,
    /// Advancing share of the market in percent
    #[serde(default)]
    pub breadth_pct: Option<f64>,
    /// Net northbound (stock-connect) flow
    #[serde(default)]
    pub northbound_net_flow: Option<f64>,
}

impl MarketSnapshot {
    /// Snapshot with every field missing.
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            fear_index: None,
            global_futures_pct: None,
            overnight_futures_pct: None,
            index_close: None,
            index_history: Vec::new(),
            breadth_pct: None,
            northbound_net_flow: None,
        }
    }
}

/// Per-sector rotation metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorMetrics {
    pub sector_id: String,
    /// Today's hot rank improvement over the prior rank
    pub rank_change: Option<i32>,
    /// Turnover-weighted share of advancing members in percent
    pub breadth_pct: Option<f64>,
    /// Consecutive sessions the sector has led
    pub leadership_days: Option<u32>,
    /// Capital inflow / outflow ratio
    pub capital_ratio: Option<f64>,
    /// Sector names appear on the dragon-tiger list
    pub dragon_tiger: bool,
    /// Northbound flow confirms the move
    pub northbound_confirmed: bool,
    /// ETF creation/redemption and stock-connect flow change
    pub hidden_fund_delta: Option<f64>,
    /// Turnover on the first leadership day
    pub day1_turnover: Option<f64>,
    /// Turnover on the third leadership day
    pub day3_turnover: Option<f64>,
}

impl SectorMetrics {
    /// At least one endorsement flag is present.
    pub fn endorsed(&self) -> bool {
        self.dragon_tiger || self.northbound_confirmed
    }
}

/// A sector member considered by the selector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockCandidate {
    pub symbol: String,
    pub sector_id: String,
    /// Turnover-amount rank within the sector, 1 = highest
    pub turnover_rank: Option<u32>,
    /// Market cap in 100M CNY
    pub market_cap: Option<f64>,
    pub pe: Option<f64>,
    /// Capital footprint score in [0, 1]
    pub footprint_score: Option<f64>,
    /// Time-series relative-strength rank in [0, 1]; derived from
    /// `daily_closes` when absent
    pub rs_rank: Option<f64>,
    /// Recent daily closes, oldest first
    pub daily_closes: Vec<f64>,
    /// Intraday strength score in [0, 1]
    pub intraday_strength: Option<f64>,
    /// Distance from the 20-day MA as a fraction of it
    pub distance_ma20: Option<f64>,
    /// Distance below the recent high as a fraction of it
    pub distance_high: Option<f64>,
    /// Net capital inflow in 100M CNY
    pub net_inflow: Option<f64>,
    /// Time of today's first limit-up, if any
    pub limit_up_time: Option<NaiveTime>,
    /// Consecutive limit-up sessions ending today
    pub consecutive_limit_days: u32,
    pub is_st: bool,
    /// Sessions since listing
    pub listed_days: Option<u32>,
    /// External risk flag (regulatory inquiry, pledge warning, ...)
    pub risk_flag: bool,
}

impl StockCandidate {
    pub fn new(symbol: impl Into<String>, sector_id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            sector_id: sector_id.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> OhlcvBar {
        OhlcvBar {
            symbol: "600519".into(),
            timestamp: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_bar_helpers() {
        let down = bar(10.0, 10.2, 9.5, 9.6);
        assert!(down.is_down());
        assert!((down.body() - 0.4).abs() < 1e-9);
        assert!((down.range() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_timeframe_display() {
        assert_eq!(Timeframe::M1.to_string(), "1M");
        assert_eq!(Timeframe::M15.to_string(), "15M");
        assert_eq!(Timeframe::Daily.to_string(), "D");
    }

    #[test]
    fn test_sector_metrics_missing_flags_default_false() {
        let metrics: SectorMetrics =
            serde_json::from_str(r#"{"sector_id": "semis", "rank_change": 6}"#).unwrap();
        assert!(!metrics.endorsed());
        assert_eq!(metrics.breadth_pct, None);
    }
}
