//! elp-router
//!
//! Trade Request Router: the single entry point that turns a strategy's
//! signal into a day-trade budget decision and, when the decision is
//! executable, an outbound order.
//!
//! Swing signals bypass the budget. Day-trade signals go through the
//! [`elp_pdt::PdtAllocator`] with the strategy's configured wait mode.
//! Every inbound signal produces at most one dispatched order.

mod journal;
mod profile;
mod router;
mod sink;

pub use journal::{DecisionJournal, JournalEntry, NullJournal};
pub use profile::{RouterProfiles, StrategyProfile, DEFAULT_HISTORICAL_SUCCESS_RATE};
pub use router::{is_actionable, RouteError, TradeRouter};
pub use sink::{ExecutionSink, OutboundOrder, SinkResult};
