//! Arbitration of the weekly day-trade budget between competing strategies.
//!
//! Per request: `SUBMITTED -> {APPROVED | QUEUED | DENIED_CONVERTED_TO_SWING}`,
//! then `QUEUED -> {APPROVED | EXPIRED}`.
//!
//! While slack exists a request is granted immediately without scoring. Once
//! the budget is used up the caller's [`WaitMode`] decides between waiting in
//! the pending set and converting to a swing trade on the spot. Pending
//! requests are scored only when a slot frees, and anything still pending when
//! the week rolls over expires.
//!
//! Lock order is always `pending -> tracker`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDate;
use elp_schemas::{AllocationDecision, AllocationOutcome, TradeId, TradeRequest};
use tracing::{debug, info, warn};

use crate::{validate_request, PdtError, PdtTracker, ScoreWeights, SlotAttempt, TradeRecord};

/// Result of [`PdtAllocator::revoke`].
#[derive(Clone, Debug, PartialEq)]
pub enum Revocation {
    /// The request was still queued; it is dropped without a decision.
    Withdrawn(TradeRequest),
    /// A granted slot was given back. Carries the pending request it went to.
    Released(Option<AllocationDecision>),
    /// The trade holds no slot this week (already released, or never flagged).
    NotHeld,
}

/// What a request does when no slot is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WaitMode {
    /// Wait in the pending set for a slot to free.
    #[default]
    Queue,
    /// Do not wait: convert to an overnight (swing) trade now.
    ConvertToSwing,
}

#[derive(Clone, Debug)]
struct Pending {
    seq: u64,
    /// Week in which the request was queued.
    week_start: NaiveDate,
    request: TradeRequest,
}

#[derive(Debug, Default)]
struct PendingSet {
    entries: Vec<Pending>,
    next_seq: u64,
    /// Expired while resolving; handed out by the next `expire_stale`.
    expired: Vec<AllocationDecision>,
    /// Rejected while resolving; handed out by `take_dropped`.
    dropped: Vec<AllocationDecision>,
}

#[derive(Debug)]
pub struct PdtAllocator {
    tracker: Arc<PdtTracker>,
    weights: ScoreWeights,
    pending: Mutex<PendingSet>,
}

impl PdtAllocator {
    pub fn new(tracker: Arc<PdtTracker>) -> Self {
        Self {
            tracker,
            weights: ScoreWeights::default(),
            pending: Mutex::new(PendingSet::default()),
        }
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn tracker(&self) -> &Arc<PdtTracker> {
        &self.tracker
    }

    pub fn weights(&self) -> ScoreWeights {
        self.weights
    }

    /// Submit one request. Always resolves within the call.
    ///
    /// Malformed requests fail with [`PdtError::InvalidRequest`] and are never
    /// queued. A store outage is not an error here: the budget is treated as
    /// exhausted and the request follows `mode`.
    pub fn request_day_trade(
        &self,
        req: TradeRequest,
        mode: WaitMode,
    ) -> Result<AllocationDecision, PdtError> {
        validate_request(&req)?;

        let mut pending = self.lock();
        if pending
            .entries
            .iter()
            .any(|p| p.request.request_id == req.request_id)
        {
            return Err(PdtError::InvalidRequest(format!(
                "request {} is already queued",
                req.request_id
            )));
        }

        let now = self.tracker.now();
        let limit = self.tracker.policy().limit_for(req.emergency);
        let reason = match self
            .tracker
            .try_consume_slot(TradeRecord::for_request(&req, now), limit)
        {
            Ok(SlotAttempt::Granted(g)) => {
                info!(
                    strategy = %req.strategy_id,
                    symbol = %req.symbol,
                    trades_used = g.trades_used,
                    trades_remaining = g.trades_remaining,
                    emergency = req.emergency,
                    "day trade approved"
                );
                let reason = format!(
                    "slot granted ({} of {} used this week)",
                    g.trades_used,
                    self.tracker.policy().weekly_cap
                );
                return Ok(AllocationDecision::new(
                    req,
                    AllocationOutcome::Approved,
                    reason,
                    now,
                ));
            }
            Ok(SlotAttempt::Exhausted { trades_used, limit }) => {
                format!("weekly day-trade budget exhausted ({trades_used} of {limit} used)")
            }
            Err(PdtError::StorageUnavailable(msg)) => {
                warn!(error = %msg, strategy = %req.strategy_id, "pdt store unavailable; denying day trade");
                format!("day-trade budget unknown (store unavailable: {msg})")
            }
            Err(e) => return Err(e),
        };

        match mode {
            WaitMode::Queue => {
                let seq = pending.next_seq;
                pending.next_seq += 1;
                let week_start = self.tracker.current_week_start();
                debug!(
                    strategy = %req.strategy_id,
                    seq,
                    queue_len = pending.entries.len() + 1,
                    "day trade queued"
                );
                pending.entries.push(Pending {
                    seq,
                    week_start,
                    request: req.clone(),
                });
                Ok(AllocationDecision::new(
                    req,
                    AllocationOutcome::Queued,
                    format!("{reason}; waiting for a slot"),
                    now,
                ))
            }
            WaitMode::ConvertToSwing => {
                warn!(
                    strategy = %req.strategy_id,
                    symbol = %req.symbol,
                    "day trade denied; converting to swing"
                );
                Ok(AllocationDecision::new(
                    req,
                    AllocationOutcome::DeniedConvertedToSwing,
                    format!("{reason}; converted to swing"),
                    now,
                ))
            }
        }
    }

    /// Grant a freed slot to the best pending request.
    ///
    /// Ranking is score (highest first), then `submitted_at` (earliest first).
    /// Requests from an earlier week are expired first and never granted.
    /// Candidates that cannot fit under their own limit (the emergency reserve)
    /// are skipped and stay queued; ones that can never be granted are dropped
    /// and the next candidate is tried. Returns `None` if nothing could be
    /// granted.
    pub fn resolve_best_pending(&self) -> Option<AllocationDecision> {
        let mut pending = self.lock();
        let stale = self.take_stale(&mut pending);
        pending.expired.extend(stale);

        if pending.entries.is_empty() {
            return None;
        }

        let now = self.tracker.now();
        'rank: loop {
            for idx in self.ranked(&pending.entries) {
                let req = &pending.entries[idx].request;
                let limit = self.tracker.policy().limit_for(req.emergency);
                match self
                    .tracker
                    .try_consume_slot(TradeRecord::for_request(req, now), limit)
                {
                    Ok(SlotAttempt::Granted(g)) => {
                        let entry = pending.entries.remove(idx);
                        let score = self.weights.score(&entry.request);
                        info!(
                            strategy = %entry.request.strategy_id,
                            symbol = %entry.request.symbol,
                            score,
                            trades_used = g.trades_used,
                            "queued day trade approved"
                        );
                        return Some(AllocationDecision::new(
                            entry.request,
                            AllocationOutcome::Approved,
                            format!("slot freed; best pending request (score {score:.6})"),
                            now,
                        ));
                    }
                    Ok(SlotAttempt::Exhausted { .. }) => continue,
                    Err(PdtError::StorageUnavailable(msg)) => {
                        warn!(error = %msg, "pdt store unavailable; leaving requests queued");
                        return None;
                    }
                    Err(e) => {
                        // Can never be granted. Drop it and re-rank the rest.
                        let entry = pending.entries.remove(idx);
                        warn!(error = %e, request_id = %entry.request.request_id, "dropping unresolvable queued request");
                        pending.dropped.push(AllocationDecision::new(
                            entry.request,
                            AllocationOutcome::Rejected,
                            e.to_string(),
                            now,
                        ));
                        continue 'rank;
                    }
                }
            }
            return None;
        }
    }

    /// Queued requests dropped by [`Self::resolve_best_pending`] because they
    /// could never be granted, as `Rejected` decisions.
    pub fn take_dropped(&self) -> Vec<AllocationDecision> {
        std::mem::take(&mut self.lock().dropped)
    }

    /// Expire every request queued in an earlier week.
    pub fn expire_stale(&self) -> Vec<AllocationDecision> {
        let mut pending = self.lock();
        let mut out = std::mem::take(&mut pending.expired);
        out.extend(self.take_stale(&mut pending));
        out
    }

    /// Give back the slot held by `trade_id` and hand it to the best pending
    /// request, if any. A still-queued request is withdrawn instead.
    pub fn revoke(&self, trade_id: TradeId) -> Result<Revocation, PdtError> {
        {
            let mut pending = self.lock();
            if let Some(idx) = pending
                .entries
                .iter()
                .position(|p| p.request.trade_id() == trade_id)
            {
                let entry = pending.entries.remove(idx);
                info!(%trade_id, "queued day trade withdrawn");
                return Ok(Revocation::Withdrawn(entry.request));
            }
        }

        if !self.tracker.release_day_trade(trade_id)? {
            return Ok(Revocation::NotHeld);
        }
        Ok(Revocation::Released(self.resolve_best_pending()))
    }

    pub fn pending_len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Pending requests in resolution order.
    pub fn pending_snapshot(&self) -> Vec<TradeRequest> {
        let pending = self.lock();
        self.ranked(&pending.entries)
            .into_iter()
            .map(|i| pending.entries[i].request.clone())
            .collect()
    }

    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, PendingSet> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Indices of `entries`, best first.
    fn ranked(&self, entries: &[Pending]) -> Vec<usize> {
        let scores: Vec<f64> = entries
            .iter()
            .map(|p| self.weights.score(&p.request))
            .collect();
        let mut idx: Vec<usize> = (0..entries.len()).collect();
        idx.sort_by(|&a, &b| {
            scores[b]
                .total_cmp(&scores[a])
                .then_with(|| entries[a].request.submitted_at.cmp(&entries[b].request.submitted_at))
                .then_with(|| entries[a].seq.cmp(&entries[b].seq))
        });
        idx
    }

    fn take_stale(&self, pending: &mut PendingSet) -> Vec<AllocationDecision> {
        let week_start = self.tracker.current_week_start();
        if pending.entries.iter().all(|p| p.week_start >= week_start) {
            return Vec::new();
        }

        let now = self.tracker.now();
        let (stale, live): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut pending.entries)
            .into_iter()
            .partition(|p| p.week_start < week_start);
        pending.entries = live;

        info!(expired = stale.len(), week_start = %week_start, "queued day trades expired at week rollover");
        stale
            .into_iter()
            .map(|p| {
                AllocationDecision::new(
                    p.request,
                    AllocationOutcome::Expired,
                    format!("queued in week of {}; week ended before a slot freed", p.week_start),
                    now,
                )
            })
            .collect()
    }
}
