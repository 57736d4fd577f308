use elp_pdt::TradeRecord;
use elp_schemas::{AllocationDecision, HoldPeriod, Signal, TradeId};

/// Something worth persisting. Produced in the order it happened.
#[derive(Clone, Debug, PartialEq)]
pub enum JournalEntry {
    Signal(Signal),
    Decision {
        decision: AllocationDecision,
        hold_period: HoldPeriod,
    },
    DayTradeGranted(TradeRecord),
    DayTradeReleased(TradeId),
}

/// Best-effort audit sink.
///
/// Called on the routing path, so implementations must return quickly and
/// must not fail the caller: hand the entry off and deal with errors
/// elsewhere.
pub trait DecisionJournal: Send + Sync {
    fn record(&self, entry: JournalEntry);
}

/// Journal that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullJournal;

impl DecisionJournal for NullJournal {
    fn record(&self, _entry: JournalEntry) {}
}
