//! elp-pdt
//!
//! Pattern-Day-Trading budget: a hard-capped weekly pool of day-trade slots
//! shared by every strategy in the process.
//!
//! - [`tracker`] owns the weekly count and the single atomic
//!   check-then-increment that grants a slot.
//! - [`allocator`] arbitrates competing requests: immediate grant while slack
//!   exists, otherwise queue (scored only when a slot frees) or convert to a
//!   swing trade, per the caller's choice.
//!
//! No network IO happens under any lock in this crate. Persistence is the
//! caller's concern and is best-effort.

pub mod allocator;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod score;
pub mod store;
pub mod tracker;

pub use allocator::{PdtAllocator, Revocation, WaitMode};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{PdtError, StoreError};
pub use score::{validate_request, ScoreWeights};
pub use store::{DayTradeStore, FlagOutcome, MemoryStore, TradeRecord};
pub use tracker::{PdtPolicy, PdtStatus, PdtTracker, SlotAttempt, SlotGrant, PDT_WEEKLY_CAP};
