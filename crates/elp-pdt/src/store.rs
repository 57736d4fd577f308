//! Day-trade ledger seam.
//!
//! The tracker's count is derived from this store, so the store is the
//! source of truth for "how many day trades this week". Implementations are
//! called while the tracker lock is held and must not block on network IO;
//! a durable database belongs behind an in-process store that is seeded at
//! boot and mirrored asynchronously.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use elp_schemas::{TradeId, TradeRequest};

use crate::StoreError;

/// One logged trade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeRecord {
    pub trade_id: TradeId,
    pub strategy_id: String,
    pub symbol: String,
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn for_request(req: &TradeRequest, executed_at: DateTime<Utc>) -> Self {
        Self {
            trade_id: req.trade_id(),
            strategy_id: req.strategy_id.clone(),
            symbol: req.symbol.clone(),
            executed_at,
        }
    }
}

/// Result of flagging a trade as a day trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagOutcome {
    Flagged,
    /// Already flagged; nothing changed.
    AlreadyFlagged,
}

pub trait DayTradeStore: Send + Sync {
    /// Log a trade. Re-logging a known id keeps the original record.
    fn log_trade(&self, trade: TradeRecord) -> Result<(), StoreError>;

    /// Mark a previously logged trade as a day trade. Idempotent.
    fn flag_day_trade(&self, trade_id: TradeId) -> Result<FlagOutcome, StoreError>;

    /// Whether `trade_id` is currently flagged. Unknown trades are not.
    fn is_flagged(&self, trade_id: TradeId) -> Result<bool, StoreError>;

    /// Clear the day-trade flag. Returns `false` if it was not flagged.
    fn unflag_day_trade(&self, trade_id: TradeId) -> Result<bool, StoreError>;

    /// Flagged trades with `executed_at >= since`.
    fn count_day_trades_since(&self, since: DateTime<Utc>) -> Result<u32, StoreError>;

    /// Drop trades executed before `before`. Optional housekeeping.
    fn prune_before(&self, _before: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}

#[derive(Clone, Debug)]
struct Entry {
    record: TradeRecord,
    day_trade: bool,
}

/// In-process store keyed by trade id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    trades: RwLock<BTreeMap<TradeId, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load already-flagged day trades (e.g. from the database at boot).
    pub fn seeded(day_trades: impl IntoIterator<Item = TradeRecord>) -> Self {
        let store = Self::new();
        {
            let mut map = store.trades.write().unwrap_or_else(PoisonError::into_inner);
            for record in day_trades {
                map.insert(
                    record.trade_id,
                    Entry {
                        record,
                        day_trade: true,
                    },
                );
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.trades
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_day_trade(&self, trade_id: TradeId) -> Option<bool> {
        self.trades
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&trade_id)
            .map(|e| e.day_trade)
    }
}

impl DayTradeStore for MemoryStore {
    fn log_trade(&self, trade: TradeRecord) -> Result<(), StoreError> {
        let mut map = self.trades.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(trade.trade_id).or_insert(Entry {
            record: trade,
            day_trade: false,
        });
        Ok(())
    }

    fn flag_day_trade(&self, trade_id: TradeId) -> Result<FlagOutcome, StoreError> {
        let mut map = self.trades.write().unwrap_or_else(PoisonError::into_inner);
        let entry = map
            .get_mut(&trade_id)
            .ok_or(StoreError::UnknownTrade(trade_id))?;
        if entry.day_trade {
            return Ok(FlagOutcome::AlreadyFlagged);
        }
        entry.day_trade = true;
        Ok(FlagOutcome::Flagged)
    }

    fn is_flagged(&self, trade_id: TradeId) -> Result<bool, StoreError> {
        Ok(self.is_day_trade(trade_id).unwrap_or(false))
    }

    fn unflag_day_trade(&self, trade_id: TradeId) -> Result<bool, StoreError> {
        let mut map = self.trades.write().unwrap_or_else(PoisonError::into_inner);
        let entry = map
            .get_mut(&trade_id)
            .ok_or(StoreError::UnknownTrade(trade_id))?;
        Ok(std::mem::replace(&mut entry.day_trade, false))
    }

    fn count_day_trades_since(&self, since: DateTime<Utc>) -> Result<u32, StoreError> {
        let map = self.trades.read().unwrap_or_else(PoisonError::into_inner);
        let n = map
            .values()
            .filter(|e| e.day_trade && e.record.executed_at >= since)
            .count();
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    fn prune_before(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut map = self.trades.write().unwrap_or_else(PoisonError::into_inner);
        let n0 = map.len();
        map.retain(|_, e| e.record.executed_at >= before);
        Ok(n0 - map.len())
    }
}
