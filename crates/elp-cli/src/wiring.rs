//! Config -> core types.

use std::sync::Arc;

use anyhow::Result;
use elp_config::engine::DEFAULT_PROFILE_KEY;
use elp_config::{
    EngineConfig, LoadedConfig, PdtSettings, ScoreWeightSettings, StrategyProfileSettings,
    UnusedKeyPolicy, WaitModeSetting,
};
use elp_pdt::{Clock, DayTradeStore, PdtAllocator, PdtPolicy, PdtTracker, ScoreWeights, WaitMode};
use elp_router::{RouterProfiles, StrategyProfile};
use tracing::warn;

/// Load layered config and its typed view. Unused keys are logged, not fatal.
pub fn load_engine_config(paths: &[String]) -> Result<(LoadedConfig, EngineConfig)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = elp_config::load_layered_yaml(&path_refs)?;
    let report = elp_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for key in &report.unused {
        warn!(key = %key, "config key is not read by the engine");
    }
    let engine = loaded.engine()?;
    Ok((loaded, engine))
}

pub fn pdt_policy(s: &PdtSettings) -> PdtPolicy {
    PdtPolicy {
        weekly_cap: s.weekly_cap,
        reference_tz: s.reference_tz,
        emergency_reserve: s.emergency_reserve,
        history_weeks: s.history_weeks,
    }
}

pub fn score_weights(s: &ScoreWeightSettings) -> ScoreWeights {
    ScoreWeights {
        confidence: s.confidence,
        profit: s.profit,
        history: s.history,
    }
}

fn wait_mode(s: WaitModeSetting) -> WaitMode {
    match s {
        WaitModeSetting::Queue => WaitMode::Queue,
        WaitModeSetting::ConvertToSwing => WaitMode::ConvertToSwing,
    }
}

fn strategy_profile(s: &StrategyProfileSettings) -> StrategyProfile {
    StrategyProfile {
        historical_success_rate: s.historical_success_rate,
        wait_mode: wait_mode(s.wait_mode),
    }
}

pub fn router_profiles(cfg: &EngineConfig) -> RouterProfiles {
    let fallback = cfg
        .strategies
        .get(DEFAULT_PROFILE_KEY)
        .map(strategy_profile)
        .unwrap_or_default();
    cfg.strategies
        .iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_PROFILE_KEY)
        .fold(RouterProfiles::new(fallback), |p, (name, s)| {
            p.with(name.clone(), strategy_profile(s))
        })
}

pub fn build_allocator(
    cfg: &EngineConfig,
    store: Arc<dyn DayTradeStore>,
    clock: Arc<dyn Clock>,
) -> Arc<PdtAllocator> {
    let tracker = PdtTracker::new(pdt_policy(&cfg.pdt), store, clock);
    Arc::new(PdtAllocator::new(Arc::new(tracker)).with_weights(score_weights(&cfg.pdt.score_weights)))
}
