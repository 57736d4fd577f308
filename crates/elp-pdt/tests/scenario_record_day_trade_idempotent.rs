use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use elp_pdt::*;
use elp_schemas::TradeId;

fn t0() -> DateTime<Utc> {
    "2026-02-18T15:00:00Z".parse().unwrap()
}

#[test]
fn scenario_flagging_twice_counts_once() {
    let clock = Arc::new(ManualClock::new(t0()));
    let t = PdtTracker::new(PdtPolicy::default(), Arc::new(MemoryStore::new()), clock);

    let id = TradeId::new();
    t.log_trade(TradeRecord {
        trade_id: id,
        strategy_id: "manual".to_string(),
        symbol: "TSLA".to_string(),
        executed_at: t0(),
    })
    .unwrap();

    assert_eq!(t.record_day_trade(id).unwrap(), FlagOutcome::Flagged);
    let after_first = t.trades_used().unwrap();
    assert_eq!(after_first, 1);

    assert_eq!(t.record_day_trade(id).unwrap(), FlagOutcome::AlreadyFlagged);
    assert_eq!(t.trades_used().unwrap(), after_first);
}

#[test]
fn scenario_trades_from_last_week_do_not_count() {
    let last_week = TradeRecord {
        trade_id: TradeId::new(),
        strategy_id: "s".to_string(),
        symbol: "TSLA".to_string(),
        executed_at: t0() - Duration::days(7),
    };
    let this_week = TradeRecord {
        trade_id: TradeId::new(),
        strategy_id: "s".to_string(),
        symbol: "TSLA".to_string(),
        executed_at: t0() - Duration::days(1),
    };
    let store = Arc::new(MemoryStore::seeded([last_week, this_week]));
    let clock = Arc::new(ManualClock::new(t0()));
    let t = PdtTracker::new(PdtPolicy::default(), store, clock);

    assert_eq!(t.trades_used().unwrap(), 1);
    assert_eq!(t.status().trades_remaining, 2);
}
