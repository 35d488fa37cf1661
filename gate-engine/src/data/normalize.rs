//! Boundary adaptation for upstream bar payloads.
//!
//! Upstream sources disagree on field names (`o`/`open`, `vol`/`volume`,
//! `ts`/`date`/`timestamp`) and sometimes omit values. [`RawBar`] accepts all
//! of those shapes; [`normalize_bars`] turns them into strict [`OhlcvBar`]s or
//! fails with an input error. Gate logic only ever sees the strict type.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::OhlcvBar;
use crate::error::{GateError, GateResult};

/// A-share exchange local time (UTC+8).
const EXCHANGE_OFFSET_SECS: i32 = 8 * 3600;

/// Timestamp as epoch milliseconds or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// A loosely-shaped bar from an upstream payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawBar {
    #[serde(alias = "ts", alias = "time", alias = "date", alias = "datetime")]
    pub timestamp: Option<RawTimestamp>,
    #[serde(alias = "o")]
    pub open: Option<f64>,
    #[serde(alias = "h")]
    pub high: Option<f64>,
    #[serde(alias = "l")]
    pub low: Option<f64>,
    #[serde(alias = "c")]
    pub close: Option<f64>,
    #[serde(alias = "v", alias = "vol")]
    pub volume: Option<f64>,
}

fn parse_timestamp(raw: &RawTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        RawTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
        RawTimestamp::Text(text) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Some(dt.with_timezone(&Utc));
            }
            let offset = FixedOffset::east_opt(EXCHANGE_OFFSET_SECS)?;
            let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M"))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

fn require(value: Option<f64>, index: usize, field: &str) -> GateResult<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(GateError::input(format!("bar {index}: {field} is not finite ({v})"))),
        None => Err(GateError::input(format!("bar {index}: missing {field}"))),
    }
}

/// Convert raw bars into validated, strictly ascending [`OhlcvBar`]s. A
/// repeated timestamp is rejected, not merged.
///
/// Rejects missing fields, non-finite values, non-positive prices, negative
/// volume, `high < low`, an open/close outside the range, and timestamps that
/// are not strictly increasing.
pub fn normalize_bars(symbol: &str, raw: &[RawBar]) -> GateResult<Vec<OhlcvBar>> {
    let mut bars: Vec<OhlcvBar> = Vec::with_capacity(raw.len());

    for (i, r) in raw.iter().enumerate() {
        let timestamp = r
            .timestamp
            .as_ref()
            .ok_or_else(|| GateError::input(format!("bar {i}: missing timestamp")))
            .and_then(|ts| {
                parse_timestamp(ts)
                    .ok_or_else(|| GateError::input(format!("bar {i}: unparseable timestamp")))
            })?;
        let open = require(r.open, i, "open")?;
        let high = require(r.high, i, "high")?;
        let low = require(r.low, i, "low")?;
        let close = require(r.close, i, "close")?;
        let volume = require(r.volume, i, "volume")?;

        if low <= 0.0 {
            return Err(GateError::input(format!("bar {i}: non-positive price")));
        }
        if high < low {
            return Err(GateError::input(format!("bar {i}: high {high} below low {low}")));
        }
        if open > high || open < low || close > high || close < low {
            return Err(GateError::input(format!("bar {i}: open/close outside range")));
        }
        if volume < 0.0 {
            return Err(GateError::input(format!("bar {i}: negative volume")));
        }

        if let Some(prev) = bars.last() {
            if timestamp == prev.timestamp {
                return Err(GateError::input(format!("bar {i}: duplicated timestamp {timestamp}")));
            }
            if timestamp < prev.timestamp {
                return Err(GateError::input(format!("bar {i}: unsorted timestamp {timestamp}")));
            }
        }

        bars.push(OhlcvBar {
            symbol: symbol.to_string(),
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Vec<RawBar> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_short_and_long_field_names() {
        let raw = parse(
            r#"[
                {"ts": "2024-03-01", "o": 10.0, "h": 10.5, "l": 9.8, "c": 10.2, "vol": 1200},
                {"timestamp": "2024-03-04T01:30:00Z", "open": 10.2, "high": 10.6,
                 "low": 10.1, "close": 10.5, "volume": 1500}
            ]"#,
        );
        let bars = normalize_bars("600036", &raw).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].symbol, "600036");
        // 2024-03-01 00:00 in UTC+8
        assert_eq!(bars[0].timestamp.to_rfc3339(), "2024-02-29T16:00:00+00:00");
        assert!((bars[1].volume - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_epoch_millis() {
        let raw = parse(r#"[{"time": 1709256600000, "o": 1, "h": 1, "l": 1, "c": 1, "v": 0}]"#);
        let bars = normalize_bars("x", &raw).unwrap();
        assert_eq!(bars[0].timestamp.timestamp_millis(), 1_709_256_600_000);
    }

    #[test]
    fn test_missing_field_is_input_error() {
        let raw = parse(r#"[{"date": "2024-03-01", "o": 10, "h": 10.5, "l": 9.8, "v": 1}]"#);
        let err = normalize_bars("x", &raw).unwrap_err();
        assert_eq!(err, GateError::input("bar 0: missing close"));
    }

    #[test]
    fn test_high_below_low_rejected() {
        let raw = parse(r#"[{"date": "2024-03-01", "o": 10, "h": 9.0, "l": 9.8, "c": 9.9, "v": 1}]"#);
        assert!(matches!(normalize_bars("x", &raw), Err(GateError::Input(_))));
    }

    #[test]
    fn test_unsorted_and_duplicate_rejected() {
        let unsorted = parse(
            r#"[
                {"date": "2024-03-04", "o": 10, "h": 10, "l": 10, "c": 10, "v": 1},
                {"date": "2024-03-01", "o": 10, "h": 10, "l": 10, "c": 10, "v": 1}
            ]"#,
        );
        let err = normalize_bars("x", &unsorted).unwrap_err();
        assert!(err.to_string().contains("unsorted"));

        let duplicated = parse(
            r#"[
                {"date": "2024-03-01", "o": 10, "h": 10, "l": 10, "c": 10, "v": 1},
                {"date": "2024-03-01", "o": 10, "h": 10, "l": 10, "c": 10, "v": 1}
            ]"#,
        );
        let err = normalize_bars("x", &duplicated).unwrap_err();
        assert!(err.to_string().contains("duplicated"));
    }
}
