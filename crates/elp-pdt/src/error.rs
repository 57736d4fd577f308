use elp_schemas::TradeId;
use thiserror::Error;

/// Failures reported by a [`crate::DayTradeStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("day-trade store unavailable: {0}")]
    Unavailable(String),
    #[error("trade {0} was never logged")]
    UnknownTrade(TradeId),
}

/// Errors surfaced by the tracker and allocator.
///
/// None of these reach the router as a fault: storage failures degrade to
/// "budget exhausted", invalid requests are rejected synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdtError {
    /// Persistence layer unreachable. Callers must treat the week as fully used.
    #[error("STORAGE_UNAVAILABLE: {0}")]
    StorageUnavailable(String),
    /// Malformed trade request; never queued.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),
    #[error("UNKNOWN_TRADE: {0}")]
    UnknownTrade(TradeId),
}

impl From<StoreError> for PdtError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => PdtError::StorageUnavailable(msg),
            StoreError::UnknownTrade(id) => PdtError::UnknownTrade(id),
        }
    }
}
