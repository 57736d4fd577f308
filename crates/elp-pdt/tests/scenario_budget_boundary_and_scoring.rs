use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use elp_pdt::*;
use elp_schemas::{AllocationDecision, AllocationOutcome, TradeRequest};
use uuid::Uuid;

// Wed 2026-02-18 10:00 ET
fn t0() -> DateTime<Utc> {
    "2026-02-18T15:00:00Z".parse().unwrap()
}

fn req(strategy: &str, confidence: f64, profit: f64, hist: f64, at: DateTime<Utc>) -> TradeRequest {
    TradeRequest {
        request_id: Uuid::new_v4(),
        strategy_id: strategy.to_string(),
        symbol: "AAPL".to_string(),
        confidence,
        estimated_profit: profit,
        historical_success_rate: hist,
        submitted_at: at,
        emergency: false,
    }
}

fn setup() -> (Arc<ManualClock>, PdtAllocator) {
    let clock = Arc::new(ManualClock::new(t0()));
    let tracker = PdtTracker::new(PdtPolicy::default(), Arc::new(MemoryStore::new()), clock.clone());
    (clock, PdtAllocator::new(Arc::new(tracker)))
}

fn resolved(r: Revocation) -> AllocationDecision {
    match r {
        Revocation::Released(Some(d)) => d,
        other => panic!("expected the freed slot to resolve a pending request, got {other:?}"),
    }
}

fn use_full_budget(a: &PdtAllocator) -> Vec<TradeRequest> {
    (0..3)
        .map(|i| {
            let r = req(&format!("early_{i}"), 0.6, 0.01, 0.8, t0());
            let d = a.request_day_trade(r.clone(), WaitMode::Queue).unwrap();
            assert_eq!(d.outcome, AllocationOutcome::Approved);
            r
        })
        .collect()
}

#[test]
fn scenario_fourth_request_is_never_approved() {
    let (_, a) = setup();
    use_full_budget(&a);

    for mode in [WaitMode::Queue, WaitMode::ConvertToSwing] {
        let d = a
            .request_day_trade(req("late", 1.0, 0.5, 1.0, t0()), mode)
            .unwrap();
        assert_ne!(d.outcome, AllocationOutcome::Approved);
    }
    assert_eq!(a.tracker().trades_used().unwrap(), 3);
}

#[test]
fn scenario_can_trade_iff_below_cap() {
    let (_, a) = setup();
    let t = a.tracker();
    for _ in 0..3 {
        assert!(t.can_trade());
        assert!(t.trades_used().unwrap() < PDT_WEEKLY_CAP);
        a.request_day_trade(req("s", 0.5, 0.01, 0.8, t0()), WaitMode::Queue)
            .unwrap();
    }
    assert_eq!(t.trades_used().unwrap(), PDT_WEEKLY_CAP);
    assert!(!t.can_trade());

    let s = t.status();
    assert_eq!(s.trades_remaining, 0);
    assert!(!s.can_trade);
    assert!(!s.degraded);
}

#[test]
fn scenario_higher_score_wins_freed_slot() {
    let (_, a) = setup();
    let granted = use_full_budget(&a);

    // R1 = 0.9 * 0.02 * 0.8 = 0.0144, R2 = 0.7 * 0.05 * 0.9 = 0.0315
    let r1 = req("r1", 0.9, 0.02, 0.8, t0());
    let r2 = req("r2", 0.7, 0.05, 0.9, t0() + Duration::seconds(5));
    a.request_day_trade(r1.clone(), WaitMode::Queue).unwrap();
    a.request_day_trade(r2.clone(), WaitMode::Queue).unwrap();

    let d = resolved(a.revoke(granted[1].trade_id()).unwrap());
    assert_eq!(d.request.request_id, r2.request_id);
    assert_eq!(d.outcome, AllocationOutcome::Approved);

    let d = resolved(a.revoke(granted[2].trade_id()).unwrap());
    assert_eq!(d.request.request_id, r1.request_id);
    assert!(a.resolve_best_pending().is_none());
}

#[test]
fn scenario_equal_scores_resolve_in_submission_order() {
    let (_, a) = setup();
    let granted = use_full_budget(&a);

    let later = req("later", 0.8, 0.03, 0.9, t0() + Duration::minutes(1));
    let earlier = req("earlier", 0.8, 0.03, 0.9, t0());
    // Submit the later-stamped one first to prove ordering is by timestamp.
    a.request_day_trade(later.clone(), WaitMode::Queue).unwrap();
    a.request_day_trade(earlier.clone(), WaitMode::Queue).unwrap();

    assert_eq!(a.pending_snapshot(), vec![earlier.clone(), later.clone()]);

    let d = resolved(a.revoke(granted[0].trade_id()).unwrap());
    assert_eq!(d.request.request_id, earlier.request_id);
}

#[test]
fn scenario_weights_change_resolution_order() {
    let clock = Arc::new(ManualClock::new(t0()));
    let tracker = PdtTracker::new(PdtPolicy::default(), Arc::new(MemoryStore::new()), clock);
    let a = PdtAllocator::new(Arc::new(tracker)).with_weights(ScoreWeights {
        confidence: 1.0,
        profit: 0.0,
        history: 1.0,
    });
    let granted = use_full_budget(&a);

    // Ignoring profit, R1 (0.72) beats R2 (0.63).
    let r1 = req("r1", 0.9, 0.02, 0.8, t0());
    let r2 = req("r2", 0.7, 0.05, 0.9, t0());
    a.request_day_trade(r1.clone(), WaitMode::Queue).unwrap();
    a.request_day_trade(r2, WaitMode::Queue).unwrap();

    let d = resolved(a.revoke(granted[0].trade_id()).unwrap());
    assert_eq!(d.request.request_id, r1.request_id);
}
