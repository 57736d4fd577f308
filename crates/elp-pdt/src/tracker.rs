//! PDT (Pattern Day Trader) weekly budget tracker.
//!
//! # Regulatory Background
//! FINRA Rule 4210 flags accounts under $25,000 that execute four or more day
//! trades within five business days. Staying at three per calendar week keeps
//! the account clear of the flag.
//!
//! # Design
//! The tracker answers two questions, "how many day trades have been used
//! this week" and "can one more be used", and owns the one operation that
//! changes the answer: [`PdtTracker::try_consume_slot`], a single
//! check-then-increment performed under one mutex. Two strategies racing for
//! the last slot can never both be granted it.
//!
//! The count is always re-derived from the [`DayTradeStore`], so a store
//! that cannot answer makes the tracker fail safe: [`PdtTracker::can_trade`]
//! returns `false` and the system runs in deny-day-trade mode until the store
//! recovers.
//!
//! Weeks are created lazily: the first touch after Monday 00:00 (reference
//! zone) closes the previous [`WeeklyBudget`] into history and opens a fresh
//! one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use elp_schemas::{TradeId, WeeklyBudget};
use tracing::{debug, info, warn};

use crate::calendar::{week_start_for, week_start_instant};
use crate::{Clock, DayTradeStore, FlagOutcome, PdtError, TradeRecord};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Day trades permitted per calendar week.
pub const PDT_WEEKLY_CAP: u32 = 3;

/// Closed weeks kept for status reporting.
pub const DEFAULT_HISTORY_WEEKS: usize = 12;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdtPolicy {
    /// Hard cap on day trades per week.
    pub weekly_cap: u32,

    /// Zone in which the week boundary (Monday 00:00) is evaluated.
    pub reference_tz: Tz,

    /// Slots only emergency (stop-loss) requests may consume.
    pub emergency_reserve: u32,

    pub history_weeks: usize,
}

impl PdtPolicy {
    /// Three per week, exchange-time weeks, no reserve.
    pub fn regulatory_defaults() -> Self {
        Self {
            weekly_cap: PDT_WEEKLY_CAP,
            reference_tz: chrono_tz::America::New_York,
            emergency_reserve: 0,
            history_weeks: DEFAULT_HISTORY_WEEKS,
        }
    }

    /// Ceiling for ordinary requests: the cap minus the emergency reserve.
    pub fn ordinary_limit(&self) -> u32 {
        self.weekly_cap.saturating_sub(self.emergency_reserve)
    }

    /// Ceiling applicable to a request.
    pub fn limit_for(&self, emergency: bool) -> u32 {
        if emergency {
            self.weekly_cap
        } else {
            self.ordinary_limit()
        }
    }
}

impl Default for PdtPolicy {
    fn default() -> Self {
        Self::regulatory_defaults()
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A granted slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotGrant {
    pub week_start: NaiveDate,
    pub trades_used: u32,
    pub trades_remaining: u32,
}

/// Result of one atomic slot attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlotAttempt {
    Granted(SlotGrant),
    /// No slot under the applicable limit; nothing was recorded.
    Exhausted { trades_used: u32, limit: u32 },
}

/// Point-in-time view for status endpoints and the CLI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PdtStatus {
    pub week_start: NaiveDate,
    pub cap: u32,
    pub trades_used: u32,
    pub trades_remaining: u32,
    pub can_trade: bool,
    /// Store could not be read; figures above assume the cap is used.
    pub degraded: bool,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Book {
    current: WeeklyBudget,
    history: VecDeque<WeeklyBudget>,
    degraded: bool,
}

pub struct PdtTracker {
    policy: PdtPolicy,
    store: Arc<dyn DayTradeStore>,
    clock: Arc<dyn Clock>,
    book: Mutex<Book>,
}

impl std::fmt::Debug for PdtTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdtTracker")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl PdtTracker {
    /// A `weekly_cap` above [`PDT_WEEKLY_CAP`] is clamped to it.
    pub fn new(mut policy: PdtPolicy, store: Arc<dyn DayTradeStore>, clock: Arc<dyn Clock>) -> Self {
        if policy.weekly_cap > PDT_WEEKLY_CAP {
            warn!(
                requested = policy.weekly_cap,
                cap = PDT_WEEKLY_CAP,
                "weekly cap above regulatory limit; clamped"
            );
            policy.weekly_cap = PDT_WEEKLY_CAP;
        }
        let week_start = week_start_for(clock.now(), policy.reference_tz);
        let book = Book {
            current: WeeklyBudget::new(week_start, policy.weekly_cap),
            history: VecDeque::new(),
            degraded: false,
        };
        Self {
            policy,
            store,
            clock,
            book: Mutex::new(book),
        }
    }

    pub fn policy(&self) -> &PdtPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Most recent Monday (reference zone) relative to now.
    pub fn current_week_start(&self) -> NaiveDate {
        week_start_for(self.clock.now(), self.policy.reference_tz)
    }

    /// [`Self::current_week_start`] as a UTC instant.
    pub fn current_week_start_utc(&self) -> DateTime<Utc> {
        week_start_instant(self.current_week_start(), self.policy.reference_tz)
    }

    /// Day trades flagged with an execution time in the current week.
    ///
    /// Fails with [`PdtError::StorageUnavailable`] if the store cannot answer;
    /// callers must then assume the cap is used.
    pub fn trades_used(&self) -> Result<u32, PdtError> {
        let mut book = self.lock();
        self.count_locked(&mut book)
    }

    /// `trades_used() < cap`. Storage failure answers `false`.
    pub fn can_trade(&self) -> bool {
        match self.trades_used() {
            Ok(n) => n < self.policy.weekly_cap,
            Err(e) => {
                warn!(error = %e, "pdt store unavailable; denying day trades");
                false
            }
        }
    }

    /// Log a trade so it can later be flagged.
    pub fn log_trade(&self, trade: TradeRecord) -> Result<(), PdtError> {
        self.store.log_trade(trade).map_err(PdtError::from)
    }

    /// Mark a previously logged trade as a day trade.
    ///
    /// Re-marking an already-flagged trade is a no-op, not an error.
    pub fn record_day_trade(&self, trade_id: TradeId) -> Result<FlagOutcome, PdtError> {
        let mut book = self.lock();
        let outcome = self.store.flag_day_trade(trade_id)?;
        if outcome == FlagOutcome::Flagged {
            // Refresh the snapshot; a store error here is already logged.
            let _ = self.count_locked(&mut book);
        }
        Ok(outcome)
    }

    /// The atomic check-then-increment.
    ///
    /// Under the tracker lock: roll the week if needed, count, and if the count
    /// is below `limit` (never above the weekly cap) log and flag `trade`.
    /// A trade that already holds a slot is refused with `InvalidRequest`,
    /// whether or not the budget has room.
    pub fn try_consume_slot(&self, trade: TradeRecord, limit: u32) -> Result<SlotAttempt, PdtError> {
        let limit = limit.min(self.policy.weekly_cap);
        let mut book = self.lock();

        let used = self.count_locked(&mut book)?;
        let trade_id = trade.trade_id;
        // Checked before the budget so a resubmitted grant is refused even
        // when the week is full, instead of waiting for a slot it already has.
        let held = self
            .store
            .is_flagged(trade_id)
            .map_err(|e| self.mark_degraded(&mut book, e.into()))?;
        if held {
            return Err(PdtError::InvalidRequest(format!(
                "trade {trade_id} already holds a day-trade slot"
            )));
        }
        if used >= limit {
            debug!(used, limit, "pdt slot attempt exhausted");
            return Ok(SlotAttempt::Exhausted {
                trades_used: used,
                limit,
            });
        }

        self.store.log_trade(trade).map_err(|e| self.mark_degraded(&mut book, e.into()))?;
        let flagged = self
            .store
            .flag_day_trade(trade_id)
            .map_err(|e| self.mark_degraded(&mut book, e.into()))?;
        if flagged == FlagOutcome::AlreadyFlagged {
            return Err(PdtError::InvalidRequest(format!(
                "trade {trade_id} already holds a day-trade slot"
            )));
        }

        // Still under the lock: nothing else can have flagged in between.
        book.current.trades_used = used + 1;
        let used = book.current.trades_used;
        Ok(SlotAttempt::Granted(SlotGrant {
            week_start: book.current.week_start,
            trades_used: used,
            trades_remaining: book.current.trades_remaining(),
        }))
    }

    /// Give back a granted slot (external cancellation).
    ///
    /// Returns `true` if a flagged day trade was released.
    pub fn release_day_trade(&self, trade_id: TradeId) -> Result<bool, PdtError> {
        let mut book = self.lock();
        let released = self.store.unflag_day_trade(trade_id)?;
        if released {
            info!(%trade_id, "pdt slot released");
            // Refresh the snapshot; a store error here is already logged.
            let _ = self.count_locked(&mut book);
        }
        Ok(released)
    }

    /// Snapshot of the current week (refreshed from the store when possible).
    pub fn budget(&self) -> WeeklyBudget {
        let mut book = self.lock();
        // On a store error the last known snapshot is returned; already logged.
        let _ = self.count_locked(&mut book);
        book.current.clone()
    }

    /// Closed weeks, oldest first.
    pub fn history(&self) -> Vec<WeeklyBudget> {
        let mut book = self.lock();
        self.roll_locked(&mut book);
        book.history.iter().cloned().collect()
    }

    pub fn status(&self) -> PdtStatus {
        let mut book = self.lock();
        let counted = self.count_locked(&mut book);
        let cap = self.policy.weekly_cap;
        let (trades_used, degraded) = match counted {
            Ok(n) => (n, false),
            Err(_) => (cap, true),
        };
        PdtStatus {
            week_start: book.current.week_start,
            cap,
            trades_used,
            trades_remaining: cap.saturating_sub(trades_used),
            can_trade: trades_used < cap,
            degraded,
        }
    }

    // -----------------------------------------------------------------------
    // Internals (book lock held)
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new week if the clock has crossed Monday 00:00.
    fn roll_locked(&self, book: &mut Book) -> bool {
        let week_start = self.current_week_start();
        if week_start <= book.current.week_start {
            return false;
        }

        let closed = std::mem::replace(
            &mut book.current,
            WeeklyBudget::new(week_start, self.policy.weekly_cap),
        );
        info!(
            closed_week = %closed.week_start,
            closed_used = closed.trades_used,
            week_start = %week_start,
            "pdt week rolled over"
        );
        book.history.push_back(closed);
        while book.history.len() > self.policy.history_weeks {
            book.history.pop_front();
        }

        // Keep one closed week of trades around for audit; older ones can go.
        let oldest_kept = book.history.back().map_or(week_start, |w| w.week_start);
        let keep_from = week_start_instant(oldest_kept, self.policy.reference_tz);
        if let Err(e) = self.store.prune_before(keep_from) {
            warn!(error = %e, "pdt store prune failed");
        }
        true
    }

    fn count_locked(&self, book: &mut Book) -> Result<u32, PdtError> {
        self.roll_locked(book);
        let since = week_start_instant(book.current.week_start, self.policy.reference_tz);
        let n = self
            .store
            .count_day_trades_since(since)
            .map_err(|e| self.mark_degraded(book, e.into()))?;

        if book.degraded {
            info!("pdt store recovered");
            book.degraded = false;
        }

        let cap = self.policy.weekly_cap;
        if n > cap {
            warn!(n, cap, "store reports more day trades than the cap; clamping");
        }
        book.current.trades_used = n.min(cap);
        Ok(book.current.trades_used)
    }

    fn mark_degraded(&self, book: &mut Book, e: PdtError) -> PdtError {
        if !book.degraded {
            warn!(error = %e, "pdt store unavailable; failing safe (budget treated as exhausted)");
        }
        book.degraded = true;
        e
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, MemoryStore, StoreError};
    use chrono::Duration;

    // Wed 2026-02-18 10:00 ET
    fn wednesday() -> DateTime<Utc> {
        "2026-02-18T15:00:00Z".parse().unwrap()
    }

    fn setup() -> (Arc<ManualClock>, Arc<MemoryStore>, PdtTracker) {
        let clock = Arc::new(ManualClock::new(wednesday()));
        let store = Arc::new(MemoryStore::new());
        let t = PdtTracker::new(PdtPolicy::regulatory_defaults(), store.clone(), clock.clone());
        (clock, store, t)
    }

    fn trade(t: &PdtTracker) -> TradeRecord {
        TradeRecord {
            trade_id: TradeId::new(),
            strategy_id: "solar_flare".to_string(),
            symbol: "AAPL".to_string(),
            executed_at: t.now(),
        }
    }

    struct DownStore;

    impl DayTradeStore for DownStore {
        fn log_trade(&self, _: TradeRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn flag_day_trade(&self, _: TradeId) -> Result<FlagOutcome, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn is_flagged(&self, _: TradeId) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn unflag_day_trade(&self, _: TradeId) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn count_day_trades_since(&self, _: DateTime<Utc>) -> Result<u32, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn fresh_week_has_full_budget() {
        let (_, _, t) = setup();
        assert_eq!(t.trades_used().unwrap(), 0);
        assert!(t.can_trade());
        assert_eq!(
            t.current_week_start(),
            NaiveDate::from_ymd_opt(2026, 2, 16).unwrap()
        );
    }

    #[test]
    fn can_trade_false_exactly_at_cap() {
        let (_, _, t) = setup();
        for i in 1..=3 {
            let a = t.try_consume_slot(trade(&t), PDT_WEEKLY_CAP).unwrap();
            assert!(matches!(a, SlotAttempt::Granted(ref g) if g.trades_used == i));
            assert_eq!(t.can_trade(), i < 3);
        }
        let a = t.try_consume_slot(trade(&t), PDT_WEEKLY_CAP).unwrap();
        assert_eq!(
            a,
            SlotAttempt::Exhausted {
                trades_used: 3,
                limit: 3
            }
        );
    }

    #[test]
    fn limit_above_cap_is_clamped() {
        let (_, _, t) = setup();
        for _ in 0..3 {
            t.try_consume_slot(trade(&t), u32::MAX).unwrap();
        }
        assert!(matches!(
            t.try_consume_slot(trade(&t), u32::MAX).unwrap(),
            SlotAttempt::Exhausted { limit: 3, .. }
        ));
    }

    #[test]
    fn record_day_trade_is_idempotent() {
        let (_, _, t) = setup();
        let r = trade(&t);
        let id = r.trade_id;
        t.log_trade(r).unwrap();

        assert_eq!(t.record_day_trade(id).unwrap(), FlagOutcome::Flagged);
        assert_eq!(t.trades_used().unwrap(), 1);
        assert_eq!(t.record_day_trade(id).unwrap(), FlagOutcome::AlreadyFlagged);
        assert_eq!(t.trades_used().unwrap(), 1);
    }

    #[test]
    fn same_trade_cannot_take_two_slots() {
        let (_, _, t) = setup();
        let r = trade(&t);
        t.try_consume_slot(r.clone(), PDT_WEEKLY_CAP).unwrap();
        assert!(matches!(
            t.try_consume_slot(r, PDT_WEEKLY_CAP),
            Err(PdtError::InvalidRequest(_))
        ));
        assert_eq!(t.trades_used().unwrap(), 1);
    }

    #[test]
    fn policy_cannot_raise_the_hard_cap() {
        let policy = PdtPolicy {
            weekly_cap: 5,
            ..PdtPolicy::regulatory_defaults()
        };
        let clock = Arc::new(ManualClock::new(wednesday()));
        let t = PdtTracker::new(policy, Arc::new(MemoryStore::new()), clock);
        assert_eq!(t.policy().weekly_cap, PDT_WEEKLY_CAP);
        for _ in 0..5 {
            t.try_consume_slot(trade(&t), 5).unwrap();
        }
        assert_eq!(t.trades_used().unwrap(), PDT_WEEKLY_CAP);
        assert!(!t.can_trade());
    }

    #[test]
    fn held_trade_is_refused_even_when_budget_is_full() {
        let (_, _, t) = setup();
        let first = trade(&t);
        t.try_consume_slot(first.clone(), PDT_WEEKLY_CAP).unwrap();
        for _ in 0..2 {
            t.try_consume_slot(trade(&t), PDT_WEEKLY_CAP).unwrap();
        }
        assert!(matches!(
            t.try_consume_slot(first, PDT_WEEKLY_CAP),
            Err(PdtError::InvalidRequest(_))
        ));
        assert_eq!(t.trades_used().unwrap(), 3);
    }

    #[test]
    fn record_unknown_trade_is_an_error() {
        let (_, _, t) = setup();
        let id = TradeId::new();
        assert_eq!(t.record_day_trade(id), Err(PdtError::UnknownTrade(id)));
    }

    #[test]
    fn week_rollover_resets_budget_and_keeps_history() {
        let (clock, _, t) = setup();
        for _ in 0..3 {
            t.try_consume_slot(trade(&t), PDT_WEEKLY_CAP).unwrap();
        }
        assert!(!t.can_trade());

        clock.advance(Duration::days(7));
        assert_eq!(t.trades_used().unwrap(), 0);
        assert!(t.can_trade());

        let h = t.history();
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].week_start, NaiveDate::from_ymd_opt(2026, 2, 16).unwrap());
        assert_eq!(h[0].trades_used, 3);
        assert_eq!(t.budget().week_start, NaiveDate::from_ymd_opt(2026, 2, 23).unwrap());
    }

    #[test]
    fn history_is_bounded() {
        let clock = Arc::new(ManualClock::new(wednesday()));
        let policy = PdtPolicy {
            history_weeks: 2,
            ..PdtPolicy::regulatory_defaults()
        };
        let t = PdtTracker::new(policy, Arc::new(MemoryStore::new()), clock.clone());
        for _ in 0..5 {
            clock.advance(Duration::days(7));
            t.budget();
        }
        assert_eq!(t.history().len(), 2);
    }

    #[test]
    fn release_frees_a_slot() {
        let (_, _, t) = setup();
        let r = trade(&t);
        let id = r.trade_id;
        t.try_consume_slot(r, PDT_WEEKLY_CAP).unwrap();
        assert_eq!(t.trades_used().unwrap(), 1);
        assert!(t.release_day_trade(id).unwrap());
        assert_eq!(t.trades_used().unwrap(), 0);
        assert!(!t.release_day_trade(id).unwrap());
    }

    #[test]
    fn storage_outage_fails_safe() {
        let clock = Arc::new(ManualClock::new(wednesday()));
        let t = PdtTracker::new(PdtPolicy::regulatory_defaults(), Arc::new(DownStore), clock);

        assert!(matches!(t.trades_used(), Err(PdtError::StorageUnavailable(_))));
        assert!(!t.can_trade());

        let s = t.status();
        assert!(s.degraded);
        assert!(!s.can_trade);
        assert_eq!(s.trades_remaining, 0);

        let r = TradeRecord {
            trade_id: TradeId::new(),
            strategy_id: "x".into(),
            symbol: "AAPL".into(),
            executed_at: wednesday(),
        };
        assert!(matches!(
            t.try_consume_slot(r, PDT_WEEKLY_CAP),
            Err(PdtError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn ordinary_limit_respects_reserve() {
        let p = PdtPolicy {
            emergency_reserve: 1,
            ..PdtPolicy::regulatory_defaults()
        };
        assert_eq!(p.limit_for(false), 2);
        assert_eq!(p.limit_for(true), 3);
    }
}
