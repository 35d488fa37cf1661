//! Market data provider contract.
//!
//! The gates never fetch data themselves. Callers materialize bars through an
//! [`OhlcvProvider`] and hand them to the pipeline; providers must return bars
//! ordered ascending and deduplicated by timestamp.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use super::{OhlcvBar, Timeframe};
use crate::error::GateError;

/// Price adjustment applied by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustMethod {
    /// Raw prices
    None,
    /// Forward-adjusted (qfq)
    #[default]
    Forward,
    /// Backward-adjusted (hfq)
    Backward,
}

/// Errors that can occur when fetching bars.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("no data for {symbol} ({timeframe})")]
    NotFound { symbol: String, timeframe: Timeframe },

    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether retrying later could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<ProviderError> for GateError {
    fn from(err: ProviderError) -> Self {
        GateError::Input(err.to_string())
    }
}

/// The `GetOHLCV` contract.
#[async_trait]
pub trait OhlcvProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &'static str;

    /// Bars for `symbol` with `start <= timestamp <= end`, ascending and
    /// deduplicated.
    async fn get_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        adjust: AdjustMethod,
    ) -> Result<Vec<OhlcvBar>, ProviderError>;
}

// ============================================================================
// In-memory provider
// ============================================================================

type SeriesKey = (String, Timeframe, AdjustMethod);

/// Provider backed by preloaded series. Used for replays and tests.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    series: RwLock<HashMap<SeriesKey, Vec<OhlcvBar>>>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a series, sorting it and keeping the last bar for any repeated
    /// timestamp.
    pub async fn insert(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        adjust: AdjustMethod,
        mut bars: Vec<OhlcvBar>,
    ) {
        bars.sort_by_key(|b| b.timestamp);
        let mut deduped: Vec<OhlcvBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.timestamp == bar.timestamp => *last = bar,
                _ => deduped.push(bar),
            }
        }

        tracing::debug!(
            symbol = %symbol,
            timeframe = %timeframe,
            bars = deduped.len(),
            "Stored bar series"
        );
        self.series
            .write()
            .await
            .insert((symbol.to_string(), timeframe, adjust), deduped);
    }
}

#[async_trait]
impl OhlcvProvider for InMemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_ohlcv(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        adjust: AdjustMethod,
    ) -> Result<Vec<OhlcvBar>, ProviderError> {
        if start > end {
            return Err(ProviderError::InvalidRange { start, end });
        }

        let series = self.series.read().await;
        let bars = series
            .get(&(symbol.to_string(), timeframe, adjust))
            .ok_or_else(|| ProviderError::NotFound {
                symbol: symbol.to_string(),
                timeframe,
            })?;

        Ok(bars
            .iter()
            .filter(|b| b.timestamp >= start && b.timestamp <= end)
            .cloned()
            .collect())
    }
}
