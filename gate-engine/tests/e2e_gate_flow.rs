//! End-to-end tests for the gate pipeline.
//!
//! Provider → normalizer → orchestrator → sentry, using synthetic series:
//! a 30-day uptrend that breaks out on double volume, a steadily rising 1m
//! session and stepping 15m structure.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;

use gate_common::config::{MacroThresholds, ThresholdsConfig};
use gate_engine::data::normalize::{normalize_bars, RawBar};
use gate_engine::data::{
    AdjustMethod, InMemoryProvider, MarketSnapshot, OhlcvBar, OhlcvProvider, SectorMetrics,
    StockCandidate, Timeframe,
};
use gate_engine::macro_filter::{MacroFilter, MacroVerdict};
use gate_engine::pipeline::{Candidate, Decision, Stage, TradeProposal};
use gate_engine::{GateError, Orchestrator, Sentry, SentryState, TradeOutcome};

const SYMBOL: &str = "000858";

// ============================================================================
// Test Data Generators
// ============================================================================

fn bar(ts: DateTime<Utc>, o: f64, h: f64, l: f64, c: f64, v: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: SYMBOL.to_string(),
        timestamp: ts,
        open: o,
        high: h,
        low: l,
        close: c,
        volume: v,
    }
}

fn breakout_daily() -> Vec<OhlcvBar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 7, 0, 0).unwrap();
    let mut bars: Vec<OhlcvBar> = (0..30)
        .map(|i| {
            let c = 10.0 + i as f64 * 0.1;
            bar(base + Duration::days(i), c - 0.02, c + 0.05, c - 0.05, c, 1000.0)
        })
        .collect();
    bars.push(bar(base + Duration::days(30), 12.88, 13.2, 12.85, 13.1, 2000.0));
    bars
}

fn session_minutes() -> Vec<OhlcvBar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 31, 1, 30, 0).unwrap();
    (0..40)
        .map(|i| {
            let c = 13.0 + i as f64 * 0.01 + if i % 2 == 0 { 0.002 } else { 0.0 };
            let v = if i == 39 { 1500.0 } else { 1000.0 };
            bar(base + Duration::minutes(i), c, c + 0.01, c - 0.01, c, v)
        })
        .collect()
}

fn session_quarters() -> Vec<OhlcvBar> {
    let base = Utc.with_ymd_and_hms(2024, 1, 31, 1, 30, 0).unwrap();
    (0..4)
        .map(|i| {
            let l = 12.9 + i as f64 * 0.05;
            bar(base + Duration::minutes(15 * i), l + 0.02, l + 0.1, l, l + 0.08, 10_000.0)
        })
        .collect()
}

fn calm_snapshot() -> MarketSnapshot {
    MarketSnapshot {
        fear_index: Some(16.5),
        global_futures_pct: Some(0.4),
        overnight_futures_pct: Some(0.2),
        index_close: Some(3050.0),
        index_history: vec![2980.0; 60],
        breadth_pct: Some(58.0),
        northbound_net_flow: Some(12.0),
        ..MarketSnapshot::empty(Utc.with_ymd_and_hms(2024, 1, 31, 1, 0, 0).unwrap())
    }
}

fn hot_sector() -> SectorMetrics {
    SectorMetrics {
        sector_id: "baijiu".into(),
        rank_change: Some(7),
        breadth_pct: Some(66.0),
        leadership_days: Some(2),
        capital_ratio: Some(0.55),
        dragon_tiger: false,
        northbound_confirmed: true,
        hidden_fund_delta: Some(0.8),
        day1_turnover: Some(120.0),
        day3_turnover: Some(100.0),
    }
}

fn members() -> Vec<StockCandidate> {
    vec![
        StockCandidate {
            turnover_rank: Some(2),
            market_cap: Some(6000.0),
            pe: Some(22.0),
            footprint_score: Some(0.9),
            rs_rank: Some(0.95),
            intraday_strength: Some(0.92),
            limit_up_time: NaiveTime::from_hms_opt(9, 41, 0),
            consecutive_limit_days: 2,
            listed_days: Some(5000),
            ..StockCandidate::new(SYMBOL, "baijiu")
        },
        StockCandidate {
            turnover_rank: Some(4),
            market_cap: Some(900.0),
            pe: Some(30.0),
            footprint_score: Some(0.7),
            rs_rank: Some(0.8),
            distance_ma20: Some(0.04),
            distance_high: Some(0.12),
            net_inflow: Some(2.3),
            listed_days: Some(3000),
            ..StockCandidate::new("600809", "baijiu")
        },
    ]
}

fn proposal() -> TradeProposal {
    TradeProposal {
        entry: Some(13.0),
        stop: Some(12.5),
        target: 14.5,
        equity: 100_000.0,
        pwin: 0.65,
        open_exposure: 0.0,
    }
}

fn candidate() -> Candidate {
    Candidate {
        symbol: SYMBOL.into(),
        snapshot: calm_snapshot(),
        sector: hot_sector(),
        sector_candidates: members(),
        daily_bars: breakout_daily(),
        minute_bars: session_minutes(),
        quarter_bars: session_quarters(),
        proposal: proposal(),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn orchestrator() -> Orchestrator {
    let thresholds = ThresholdsConfig::default();
    let sentry = Arc::new(Sentry::new(thresholds.sentry.clone(), day(31)));
    Orchestrator::new(thresholds, sentry).unwrap()
}

fn loss(pnl_pct: f64) -> TradeOutcome {
    TradeOutcome {
        pnl_pct,
        release_risk_pct: 0.0,
    }
}

// ============================================================================
// Pipeline flow
// ============================================================================

#[tokio::test]
async fn test_provider_to_decision() {
    let provider = InMemoryProvider::new();
    provider
        .insert(SYMBOL, Timeframe::Daily, AdjustMethod::Forward, breakout_daily())
        .await;
    provider
        .insert(SYMBOL, Timeframe::M1, AdjustMethod::Forward, session_minutes())
        .await;
    provider
        .insert(SYMBOL, Timeframe::M15, AdjustMethod::Forward, session_quarters())
        .await;

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let fetch = |tf| provider.get_ohlcv(SYMBOL, tf, start, end, AdjustMethod::Forward);

    let c = Candidate {
        daily_bars: fetch(Timeframe::Daily).await.unwrap(),
        minute_bars: fetch(Timeframe::M1).await.unwrap(),
        quarter_bars: fetch(Timeframe::M15).await.unwrap(),
        ..candidate()
    };
    let eval = orchestrator().evaluate(&c).unwrap();
    let Decision::Execute(approval) = &eval.decision else {
        panic!("expected EXECUTE, got {:?}", eval.decision);
    };
    assert_eq!(approval.symbol, SYMBOL);
    assert_eq!(approval.shares, 1900);
    assert_eq!(eval.trail.len(), 6);
    assert!(eval.trail.iter().all(|r| r.reason.is_none()));
}

#[test]
fn test_missing_series_is_an_input_error() {
    let provider = InMemoryProvider::new();
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let err = tokio_test::block_on(provider.get_ohlcv(
        SYMBOL,
        Timeframe::Daily,
        start,
        end,
        AdjustMethod::Forward,
    ))
    .unwrap_err();
    assert!(!err.is_recoverable());
    assert!(matches!(GateError::from(err), GateError::Input(_)));
}

#[test]
fn test_normalized_payload_feeds_signal() {
    // upstream payload with short field names and exchange-local dates
    let raw: Vec<RawBar> = breakout_daily()
        .iter()
        .map(|b| {
            serde_json::from_value(serde_json::json!({
                "date": (b.timestamp + Duration::hours(8)).format("%Y-%m-%d %H:%M:%S").to_string(),
                "o": b.open, "h": b.high, "l": b.low, "c": b.close, "vol": b.volume,
            }))
            .unwrap()
        })
        .collect();
    let daily = normalize_bars(SYMBOL, &raw).unwrap();
    assert_eq!(daily, breakout_daily());

    let eval = orchestrator()
        .evaluate(&Candidate {
            daily_bars: daily,
            ..candidate()
        })
        .unwrap();
    assert_eq!(eval.decision.label(), "EXECUTE");
}

#[test]
fn test_second_line_candidate_is_tradeable() {
    let mut c = candidate();
    c.symbol = "600809".into();
    for b in c
        .daily_bars
        .iter_mut()
        .chain(c.minute_bars.iter_mut())
        .chain(c.quarter_bars.iter_mut())
    {
        b.symbol = "600809".into();
    }
    let eval = orchestrator().evaluate(&c).unwrap();
    let approval = eval.decision.approval().expect("approved");
    assert_eq!(
        approval.classification,
        gate_engine::selector::Classification::SecondLine
    );
}

#[test]
fn test_evaluation_is_deterministic() {
    let orch = orchestrator();
    let first = orch.evaluate(&candidate()).unwrap();
    let second = orch.evaluate(&candidate()).unwrap();
    assert_eq!(
        serde_json::to_string(&first.decision).unwrap(),
        serde_json::to_string(&second.decision).unwrap()
    );
    assert_eq!(first.trail, second.trail);
}

// ============================================================================
// Sentry
// ============================================================================

#[test]
fn test_daily_halt_blocks_until_next_session() {
    let orch = orchestrator();
    orch.sentry().record_outcome(&loss(-1.0)).unwrap();
    assert_eq!(orch.sentry().record_outcome(&loss(-1.1)).unwrap(), SentryState::DailyHalt);

    for _ in 0..2 {
        let eval = orch.evaluate(&candidate()).unwrap();
        let rejection = eval.decision.rejection().unwrap();
        assert_eq!(rejection.stage, Stage::Sentry);
        assert_eq!(rejection.reason, "sentry:halt");
    }
    let admitted = orch.admit(&candidate()).unwrap();
    assert_eq!(admitted.decision.rejection().unwrap().reason, "sentry:halt");

    orch.sentry()
        .begin_session(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        .unwrap();
    let eval = orch.evaluate(&candidate()).unwrap();
    assert!(eval.decision.approval().is_some());
}

#[test]
fn test_monthly_halt_needs_operator() {
    let thresholds = ThresholdsConfig::default();
    let sentry = Arc::new(Sentry::new(thresholds.sentry.clone(), day(10)));
    let orch = Orchestrator::new(thresholds, Arc::clone(&sentry)).unwrap();

    for (d, pnl) in [(10, -1.9), (11, -1.9), (12, -1.3)] {
        sentry.begin_session(day(d)).unwrap();
        sentry.record_outcome(&loss(pnl)).unwrap();
    }
    assert_eq!(sentry.snapshot().unwrap().state, SentryState::MonthlyHalt);

    for d in 13..=16 {
        sentry.begin_session(day(d)).unwrap();
        let eval = orch.evaluate(&candidate()).unwrap();
        assert_eq!(eval.decision.rejection().unwrap().reason, "sentry:halt");
    }

    sentry.operator_reset(day(17));
    assert!(orch.evaluate(&candidate()).unwrap().decision.approval().is_some());
}

#[test]
fn test_concurrent_admissions_respect_daily_budget() {
    let orch = Arc::new(orchestrator());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let orch = Arc::clone(&orch);
            std::thread::spawn(move || orch.admit(&candidate()).unwrap())
        })
        .collect();
    let evals: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let admitted = evals.iter().filter(|e| e.decision.approval().is_some()).count();
    let refused = evals
        .iter()
        .filter_map(|e| e.decision.rejection())
        .filter(|r| r.reason == "sentry:risk_budget")
        .count();
    // each admission reserves 1.0241% against a 2% daily limit
    assert_eq!(admitted, 1);
    assert_eq!(refused, 7);

    let open = orch.sentry().snapshot().unwrap().open_risk_pct;
    assert!((open - 1.0241).abs() < 1e-9);
}

#[test]
fn test_released_risk_frees_budget() {
    let orch = orchestrator();
    assert!(orch.admit(&candidate()).unwrap().decision.approval().is_some());
    assert!(orch.admit(&candidate()).unwrap().decision.rejection().is_some());

    orch.sentry()
        .record_outcome(&TradeOutcome {
            pnl_pct: 0.4,
            release_risk_pct: 1.0241,
        })
        .unwrap();
    assert!(orch.admit(&candidate()).unwrap().decision.approval().is_some());
}

#[test]
fn test_non_finite_outcome_is_rejected_without_fault() {
    let orch = orchestrator();
    let err = orch
        .sentry()
        .record_outcome(&loss(f64::INFINITY))
        .unwrap_err();
    // a non-finite outcome is bad input, not corruption
    assert!(matches!(err, GateError::Input(_)));
    assert!(orch.evaluate(&candidate()).is_ok());
}

// ============================================================================
// Properties
// ============================================================================

fn arb_snapshot() -> impl Strategy<Value = MarketSnapshot> {
    (
        25.0001f64..200.0,
        prop::option::of(-10.0f64..10.0),
        prop::option::of(2000.0f64..5000.0),
        prop::option::of(0.0f64..100.0),
        prop::option::of(-100.0f64..100.0),
    )
        .prop_map(|(fear, futures, close, breadth, northbound)| MarketSnapshot {
            fear_index: Some(fear),
            global_futures_pct: futures,
            index_close: close,
            index_history: vec![3000.0; 60],
            breadth_pct: breadth,
            northbound_net_flow: northbound,
            ..MarketSnapshot::empty(Utc.with_ymd_and_hms(2024, 1, 31, 1, 0, 0).unwrap())
        })
}

proptest! {
    #[test]
    fn prop_fear_above_max_always_blocks(snapshot in arb_snapshot()) {
        let filter = MacroFilter::new(MacroThresholds::default());
        let result = filter.evaluate(&snapshot);
        prop_assert_eq!(result.verdict, MacroVerdict::Block);
        prop_assert_eq!(result.size_multiplier, 0.0);

        let c = Candidate { snapshot, ..candidate() };
        let eval = orchestrator().evaluate(&c).unwrap();
        let rejection = eval.decision.rejection().unwrap();
        prop_assert_eq!(rejection.stage, Stage::Macro);
        prop_assert_eq!(rejection.reason.as_str(), "macro:fear_index");
    }

    #[test]
    fn prop_stop_at_or_above_entry_never_trades(offset in 0.0f64..2.0) {
        let mut c = candidate();
        c.proposal.stop = Some(13.0 + offset);
        let eval = orchestrator().evaluate(&c).unwrap();
        prop_assert_eq!(
            eval.decision.rejection().map(|r| r.reason.as_str()),
            Some("risk:stop_not_below_entry")
        );
    }
}
