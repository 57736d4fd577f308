use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use elp_pdt::{PdtAllocator, PdtError, Revocation, TradeRecord};
use elp_schemas::{
    Action, AllocationDecision, AllocationOutcome, HoldPeriod, Signal, TradeId, TradeRequest,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{DecisionJournal, ExecutionSink, JournalEntry, NullJournal, OutboundOrder, RouterProfiles};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Hold actions and zero-confidence signals carry no trading intent.
    #[error("NOT_ACTIONABLE: signal {signal_id}: {reason}")]
    NotActionable { signal_id: Uuid, reason: String },
    #[error("DUPLICATE_SIGNAL: {0}")]
    DuplicateSignal(Uuid),
}

/// Whether a signal expresses trading intent at all.
pub fn is_actionable(signal: &Signal) -> Result<(), RouteError> {
    if signal.action == Action::Hold {
        return Err(RouteError::NotActionable {
            signal_id: signal.signal_id,
            reason: "action is hold".to_string(),
        });
    }
    if signal.confidence.is_nan() || signal.confidence <= 0.0 {
        return Err(RouteError::NotActionable {
            signal_id: signal.signal_id,
            reason: format!("confidence {} is not positive", signal.confidence),
        });
    }
    Ok(())
}

pub struct TradeRouter {
    allocator: Arc<PdtAllocator>,
    profiles: RouterProfiles,
    sink: Arc<dyn ExecutionSink>,
    journal: Arc<dyn DecisionJournal>,
    /// Signals whose day-trade request is queued, keyed by request id.
    waiting: Mutex<HashMap<Uuid, Signal>>,
}

impl std::fmt::Debug for TradeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeRouter")
            .field("allocator", &self.allocator)
            .field("profiles", &self.profiles)
            .finish_non_exhaustive()
    }
}

impl TradeRouter {
    pub fn new(
        allocator: Arc<PdtAllocator>,
        profiles: RouterProfiles,
        sink: Arc<dyn ExecutionSink>,
    ) -> Self {
        Self {
            allocator,
            profiles,
            sink,
            journal: Arc::new(NullJournal),
            waiting: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_journal(mut self, journal: Arc<dyn DecisionJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn allocator(&self) -> &Arc<PdtAllocator> {
        &self.allocator
    }

    pub fn profiles(&self) -> &RouterProfiles {
        &self.profiles
    }

    /// Signals currently waiting for a slot.
    pub fn waiting_len(&self) -> usize {
        self.waiting().len()
    }

    /// Route one inbound signal.
    ///
    /// Returns the decision for this signal. Approved and converted decisions
    /// are dispatched to the execution sink before returning; a queued one is
    /// dispatched later by [`Self::on_tick`] or [`Self::cancel_day_trade`] if
    /// it materializes. Malformed requests come back as `Rejected`.
    pub fn handle_signal(&self, signal: Signal) -> Result<AllocationDecision, RouteError> {
        is_actionable(&signal)?;
        self.journal.record(JournalEntry::Signal(signal.clone()));

        if !signal.is_day_trade {
            let decision = AllocationDecision::new(
                self.swing_request(&signal),
                AllocationOutcome::Approved,
                "swing trade; day-trade budget not consulted",
                self.allocator.tracker().now(),
            );
            debug!(signal_id = %signal.signal_id, strategy = %signal.strategy, "swing signal routed");
            self.finish(signal, HoldPeriod::Overnight, decision.clone());
            return Ok(decision);
        }

        let profile = self.profiles.get(&signal.strategy);
        let req = TradeRequest::from_signal(&signal, profile.historical_success_rate);

        // Held across the submission: a concurrent tick or cancel that
        // resolves this request blocks in `materialize` until the signal is
        // parked and QUEUED is journaled, so the resolution is recorded after it.
        let mut waiting = self.waiting();
        if waiting.contains_key(&req.request_id) {
            return Err(RouteError::DuplicateSignal(signal.signal_id));
        }

        let decision = match self.allocator.request_day_trade(req.clone(), profile.wait_mode) {
            Ok(d) => d,
            Err(e) => {
                warn!(signal_id = %signal.signal_id, strategy = %signal.strategy, error = %e, "trade request rejected");
                AllocationDecision::new(
                    req,
                    AllocationOutcome::Rejected,
                    e.to_string(),
                    self.allocator.tracker().now(),
                )
            }
        };

        if decision.outcome == AllocationOutcome::Queued {
            waiting.insert(decision.request.request_id, signal);
            self.record_decision(&decision, HoldPeriod::SameDay);
            return Ok(decision);
        }
        drop(waiting);

        match decision.outcome {
            AllocationOutcome::Approved => {
                self.finish_day_trade(signal, decision.clone());
            }
            AllocationOutcome::DeniedConvertedToSwing => {
                self.finish(signal, HoldPeriod::Overnight, decision.clone());
            }
            _ => self.record_decision(&decision, HoldPeriod::SameDay),
        }
        Ok(decision)
    }

    /// Periodic housekeeping: expire requests left over from an earlier week,
    /// then hand any free slots to waiting requests.
    ///
    /// Returns every decision made: expirations, then grants, then queued
    /// requests rejected as unresolvable.
    pub fn on_tick(&self) -> Vec<AllocationDecision> {
        let mut out = Vec::new();

        let expired = self.allocator.expire_stale();
        if !expired.is_empty() {
            info!(expired = expired.len(), "week rolled over; queued day trades expired");
        }
        for decision in expired {
            self.waiting().remove(&decision.request.request_id);
            self.record_decision(&decision, HoldPeriod::SameDay);
            out.push(decision);
        }

        while let Some(decision) = self.allocator.resolve_best_pending() {
            self.materialize(decision.clone());
            out.push(decision);
        }
        out.extend(self.retire_dropped());
        out
    }

    /// External cancellation of a day trade.
    ///
    /// A granted slot is given back and offered to the best waiting request,
    /// which is dispatched immediately. A still-queued request is withdrawn.
    pub fn cancel_day_trade(
        &self,
        trade_id: TradeId,
    ) -> Result<Option<AllocationDecision>, PdtError> {
        match self.allocator.revoke(trade_id)? {
            Revocation::Withdrawn(req) => {
                self.waiting().remove(&req.request_id);
                info!(%trade_id, strategy = %req.strategy_id, "waiting signal withdrawn");
                Ok(None)
            }
            Revocation::Released(resolved) => {
                self.journal.record(JournalEntry::DayTradeReleased(trade_id));
                if let Some(decision) = &resolved {
                    self.materialize(decision.clone());
                }
                self.retire_dropped();
                Ok(resolved)
            }
            Revocation::NotHeld => {
                debug!(%trade_id, "cancel for a trade holding no slot");
                Ok(None)
            }
        }
    }

    // -----------------------------------------------------------------------

    fn waiting(&self) -> MutexGuard<'_, HashMap<Uuid, Signal>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn swing_request(&self, signal: &Signal) -> TradeRequest {
        let profile = self.profiles.get(&signal.strategy);
        TradeRequest::from_signal(signal, profile.historical_success_rate)
    }

    /// Dispatch a request resolved out of the queue.
    fn materialize(&self, decision: AllocationDecision) {
        match self.waiting().remove(&decision.request.request_id) {
            Some(signal) => self.finish_day_trade(signal, decision),
            None => {
                warn!(
                    request_id = %decision.request.request_id,
                    "resolved request has no waiting signal; not dispatched"
                );
                self.record_decision(&decision, HoldPeriod::SameDay);
            }
        }
    }

    /// Journal queued requests the allocator gave up on and forget their signals.
    fn retire_dropped(&self) -> Vec<AllocationDecision> {
        let dropped = self.allocator.take_dropped();
        for decision in &dropped {
            self.waiting().remove(&decision.request.request_id);
            self.record_decision(decision, HoldPeriod::SameDay);
        }
        dropped
    }

    fn finish_day_trade(&self, signal: Signal, decision: AllocationDecision) {
        self.journal.record(JournalEntry::DayTradeGranted(TradeRecord::for_request(
            &decision.request,
            decision.decided_at,
        )));
        self.finish(signal, HoldPeriod::SameDay, decision);
    }

    fn finish(&self, mut signal: Signal, hold_period: HoldPeriod, decision: AllocationDecision) {
        self.record_decision(&decision, hold_period);
        signal.is_day_trade = hold_period == HoldPeriod::SameDay;

        let order = OutboundOrder {
            signal,
            hold_period,
            decision,
        };
        let signal_id = order.signal.signal_id;
        if let Err(e) = self.sink.submit(order) {
            warn!(%signal_id, error = %e, "execution sink refused order; budget decision stands");
        }
    }

    fn record_decision(&self, decision: &AllocationDecision, hold_period: HoldPeriod) {
        self.journal.record(JournalEntry::Decision {
            decision: decision.clone(),
            hold_period,
        });
    }
}
