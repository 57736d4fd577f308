//! elp-schemas
//!
//! Closed-set data model shared by the PDT core, the router and persistence.
//! Plain data only: no IO, no clocks, no policy.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Direction a strategy wants to trade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        }
    }
}

/// Intended holding period of the position a signal opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldPeriod {
    /// Opened and closed within the same session: consumes a day-trade slot.
    SameDay,
    /// Held overnight or longer: not subject to the weekly cap.
    Overnight,
}

impl HoldPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldPeriod::SameDay => "SAME_DAY",
            HoldPeriod::Overnight => "OVERNIGHT",
        }
    }
}

/// A single strategy-specific metadata value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

/// Strategy metadata attached to a signal.
///
/// `stop_loss` is the one flag the core itself reads; everything else is
/// carried through to execution and persistence untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// Signal closes an existing position at a loss.
    #[serde(default)]
    pub stop_loss: bool,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, MetadataValue>,
}

impl SignalMetadata {
    pub fn stop_loss() -> Self {
        Self {
            stop_loss: true,
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, k: impl Into<String>, v: MetadataValue) -> Self {
        self.extra.insert(k.into(), v);
        self
    }
}

/// Trading intent emitted by a strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub signal_id: Uuid,
    pub strategy: String,
    pub symbol: String,
    pub action: Action,
    /// Strategy confidence in `[0, 1]`.
    pub confidence: f64,
    /// Expected profit as a decimal fraction (0.02 = 2%).
    pub estimated_profit: f64,
    /// `true` when the strategy intends to close the position the same session.
    pub is_day_trade: bool,
    pub emitted_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: SignalMetadata,
}

impl Signal {
    pub fn hold_period(&self) -> HoldPeriod {
        if self.is_day_trade {
            HoldPeriod::SameDay
        } else {
            HoldPeriod::Overnight
        }
    }
}

// ---------------------------------------------------------------------------
// Trade request
// ---------------------------------------------------------------------------

/// Request for one slot of the weekly day-trade budget.
///
/// Built once by the router and consumed by the allocator; never mutated
/// after a decision has been made about it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Also used as the trade id recorded in the day-trade store.
    pub request_id: Uuid,
    pub strategy_id: String,
    pub symbol: String,
    pub confidence: f64,
    pub estimated_profit: f64,
    pub historical_success_rate: f64,
    pub submitted_at: DateTime<Utc>,
    /// Stop-loss exit allowed to draw on the emergency reserve.
    #[serde(default)]
    pub emergency: bool,
}

impl TradeRequest {
    pub fn from_signal(signal: &Signal, historical_success_rate: f64) -> Self {
        Self {
            request_id: signal.signal_id,
            strategy_id: signal.strategy.clone(),
            symbol: signal.symbol.clone(),
            confidence: signal.confidence,
            estimated_profit: signal.estimated_profit,
            historical_success_rate,
            submitted_at: signal.emitted_at,
            emergency: signal.action == Action::Sell && signal.metadata.stop_loss,
        }
    }

    pub fn trade_id(&self) -> TradeId {
        TradeId(self.request_id)
    }
}

/// Identifier of a logged trade in the day-trade store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub Uuid);

impl TradeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TradeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Terminal or intermediate result of an allocation attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationOutcome {
    Approved,
    DeniedConvertedToSwing,
    Queued,
    /// Queued in a week that has since ended.
    Expired,
    /// Malformed request; never queued.
    Rejected,
}

impl AllocationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationOutcome::Approved => "APPROVED",
            AllocationOutcome::DeniedConvertedToSwing => "DENIED_CONVERTED_TO_SWING",
            AllocationOutcome::Queued => "QUEUED",
            AllocationOutcome::Expired => "EXPIRED",
            AllocationOutcome::Rejected => "REJECTED",
        }
    }

    /// Whether the execution layer should act on this outcome.
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            AllocationOutcome::Approved | AllocationOutcome::DeniedConvertedToSwing
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationDecision {
    pub request: TradeRequest,
    pub outcome: AllocationOutcome,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
}

impl AllocationDecision {
    pub fn new(
        request: TradeRequest,
        outcome: AllocationOutcome,
        reason: impl Into<String>,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request,
            outcome,
            reason: reason.into(),
            decided_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Weekly budget
// ---------------------------------------------------------------------------

/// Day-trade usage for one calendar week.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyBudget {
    /// Monday of the week in the reference timezone.
    pub week_start: NaiveDate,
    pub cap: u32,
    pub trades_used: u32,
}

impl WeeklyBudget {
    pub fn new(week_start: NaiveDate, cap: u32) -> Self {
        Self {
            week_start,
            cap,
            trades_used: 0,
        }
    }

    pub fn trades_remaining(&self) -> u32 {
        self.cap.saturating_sub(self.trades_used)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
