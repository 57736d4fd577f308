use std::collections::HashMap;

use elp_pdt::WaitMode;

/// Historical success rate applied when a strategy has no track record.
pub const DEFAULT_HISTORICAL_SUCCESS_RATE: f64 = 0.8;

/// Per-strategy routing inputs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrategyProfile {
    pub historical_success_rate: f64,
    /// Tolerance for delayed execution.
    pub wait_mode: WaitMode,
}

impl Default for StrategyProfile {
    fn default() -> Self {
        Self {
            historical_success_rate: DEFAULT_HISTORICAL_SUCCESS_RATE,
            wait_mode: WaitMode::Queue,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RouterProfiles {
    fallback: StrategyProfile,
    by_strategy: HashMap<String, StrategyProfile>,
}

impl RouterProfiles {
    pub fn new(fallback: StrategyProfile) -> Self {
        Self {
            fallback,
            by_strategy: HashMap::new(),
        }
    }

    pub fn with(mut self, strategy: impl Into<String>, profile: StrategyProfile) -> Self {
        self.by_strategy.insert(strategy.into(), profile);
        self
    }

    /// Profile for `strategy`, or the fallback.
    pub fn get(&self, strategy: &str) -> StrategyProfile {
        self.by_strategy
            .get(strategy)
            .copied()
            .unwrap_or(self.fallback)
    }

    pub fn len(&self) -> usize {
        self.by_strategy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_strategy.is_empty()
    }
}
