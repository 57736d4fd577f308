use elp_schemas::{AllocationDecision, HoldPeriod, Signal};

/// Convenience alias for execution-side failures.
pub type SinkResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// An executable decision together with the signal it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundOrder {
    /// The originating signal. For a converted trade `is_day_trade` is cleared.
    pub signal: Signal,
    pub hold_period: HoldPeriod,
    pub decision: AllocationDecision,
}

/// Execution layer seam (broker adapter, paper engine, logger).
///
/// Only executable decisions reach the sink. A failure here is logged by the
/// router; the budget grant that preceded it stands.
pub trait ExecutionSink: Send + Sync {
    fn submit(&self, order: OutboundOrder) -> SinkResult;
}
