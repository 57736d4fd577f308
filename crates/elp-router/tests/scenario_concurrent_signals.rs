use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, Utc};
use elp_pdt::*;
use elp_router::*;
use elp_schemas::{Action, AllocationOutcome, HoldPeriod, Signal, SignalMetadata};
use uuid::Uuid;

#[derive(Default)]
struct CountingSink {
    same_day: AtomicUsize,
    overnight: AtomicUsize,
}

impl ExecutionSink for CountingSink {
    fn submit(&self, order: OutboundOrder) -> SinkResult {
        match order.hold_period {
            HoldPeriod::SameDay => self.same_day.fetch_add(1, Ordering::SeqCst),
            HoldPeriod::Overnight => self.overnight.fetch_add(1, Ordering::SeqCst),
        };
        Ok(())
    }
}

fn t0() -> DateTime<Utc> {
    "2026-02-18T15:00:00Z".parse().unwrap()
}

#[test]
fn scenario_parallel_strategies_get_exactly_three_day_trades() {
    let clock = Arc::new(ManualClock::new(t0()));
    let tracker = PdtTracker::new(PdtPolicy::default(), Arc::new(MemoryStore::new()), clock);
    let allocator = Arc::new(PdtAllocator::new(Arc::new(tracker)));
    let profiles = RouterProfiles::new(StrategyProfile {
        historical_success_rate: 0.8,
        wait_mode: WaitMode::ConvertToSwing,
    });
    let sink = Arc::new(CountingSink::default());
    let router = Arc::new(TradeRouter::new(allocator, profiles, sink.clone()));

    let n = 12;
    let barrier = Arc::new(Barrier::new(n));
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let router = Arc::clone(&router);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let s = Signal {
                    signal_id: Uuid::new_v4(),
                    strategy: format!("strat_{i}"),
                    symbol: "SPY".to_string(),
                    action: Action::Buy,
                    confidence: 0.8,
                    estimated_profit: 0.02,
                    is_day_trade: true,
                    emitted_at: t0(),
                    metadata: SignalMetadata::default(),
                };
                barrier.wait();
                router.handle_signal(s).unwrap().outcome
            })
        })
        .collect();

    let outcomes: Vec<AllocationOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let approved = outcomes.iter().filter(|o| **o == AllocationOutcome::Approved).count();

    assert_eq!(approved, 3);
    assert_eq!(sink.same_day.load(Ordering::SeqCst), 3);
    assert_eq!(sink.overnight.load(Ordering::SeqCst), n - 3);
    assert_eq!(router.allocator().tracker().trades_used().unwrap(), 3);
}

#[derive(Default)]
struct OrderedJournal {
    entries: std::sync::Mutex<Vec<(Uuid, AllocationOutcome)>>,
}

impl DecisionJournal for OrderedJournal {
    fn record(&self, entry: JournalEntry) {
        if let JournalEntry::Decision { decision, .. } = entry {
            self.entries
                .lock()
                .unwrap()
                .push((decision.request.request_id, decision.outcome));
        }
    }
}

#[test]
fn scenario_queued_is_journaled_before_its_resolution() {
    for _ in 0..20 {
        let clock = Arc::new(ManualClock::new(t0()));
        let tracker = PdtTracker::new(PdtPolicy::default(), Arc::new(MemoryStore::new()), clock);
        let allocator = Arc::new(PdtAllocator::new(Arc::new(tracker)));
        let sink = Arc::new(CountingSink::default());
        let journal = Arc::new(OrderedJournal::default());
        let router = Arc::new(
            TradeRouter::new(allocator, RouterProfiles::default(), sink).with_journal(journal.clone()),
        );

        let signal = |strategy: String| Signal {
            signal_id: Uuid::new_v4(),
            strategy,
            symbol: "SPY".to_string(),
            action: Action::Buy,
            confidence: 0.8,
            estimated_profit: 0.02,
            is_day_trade: true,
            emitted_at: t0(),
            metadata: SignalMetadata::default(),
        };
        let granted: Vec<Signal> = (0..3)
            .map(|i| {
                let s = signal(format!("early_{i}"));
                router.handle_signal(s.clone()).unwrap();
                s
            })
            .collect();

        let n = 6;
        let barrier = Arc::new(Barrier::new(n + 1));
        let mut handles = Vec::new();
        for i in 0..n {
            let router = Arc::clone(&router);
            let barrier = Arc::clone(&barrier);
            let s = signal(format!("late_{i}"));
            handles.push(thread::spawn(move || {
                barrier.wait();
                router.handle_signal(s).unwrap();
            }));
        }
        {
            let router = Arc::clone(&router);
            let barrier = Arc::clone(&barrier);
            let ids: Vec<_> = granted.iter().map(|s| elp_schemas::TradeId(s.signal_id)).collect();
            handles.push(thread::spawn(move || {
                barrier.wait();
                for id in ids {
                    router.cancel_day_trade(id).unwrap();
                    router.on_tick();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let entries = journal.entries.lock().unwrap().clone();
        for (pos, (id, outcome)) in entries.iter().enumerate() {
            if *outcome == AllocationOutcome::Queued {
                let approved_earlier = entries[..pos]
                    .iter()
                    .any(|(other, o)| other == id && *o == AllocationOutcome::Approved);
                assert!(!approved_earlier, "request {id} journaled APPROVED before QUEUED");
            }
        }
        assert_eq!(router.allocator().tracker().trades_used().unwrap(), 3);
    }
}
