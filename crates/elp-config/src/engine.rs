//! Typed engine configuration.
//!
//! Every section is optional; an empty document yields the regulatory defaults
//! (3 day trades per week, exchange-time weeks, plain product scoring).

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under `strategies:` used when a strategy has no profile of its own.
pub const DEFAULT_PROFILE_KEY: &str = "default";

/// Historical success assumed for strategies without a track record.
pub const DEFAULT_HISTORICAL_SUCCESS_RATE: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub pdt: PdtSettings,
    #[serde(default)]
    pub strategies: BTreeMap<String, StrategyProfileSettings>,
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pdt: PdtSettings::default(),
            strategies: BTreeMap::new(),
            database: DatabaseSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate the typed view of a merged config document.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: EngineConfig =
            serde_json::from_value(config_json.clone()).context("invalid engine config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let pdt = &self.pdt;
        if pdt.weekly_cap == 0 || pdt.weekly_cap > MAX_WEEKLY_CAP {
            bail!(
                "CONFIG_INVALID pdt.weekly_cap ({}) must be in 1..={MAX_WEEKLY_CAP}",
                pdt.weekly_cap
            );
        }
        if pdt.emergency_reserve >= pdt.weekly_cap {
            bail!(
                "CONFIG_INVALID pdt.emergency_reserve ({}) must be below pdt.weekly_cap ({})",
                pdt.emergency_reserve,
                pdt.weekly_cap
            );
        }
        for (name, w) in [
            ("confidence", pdt.score_weights.confidence),
            ("profit", pdt.score_weights.profit),
            ("history", pdt.score_weights.history),
        ] {
            if !w.is_finite() || w < 0.0 {
                bail!("CONFIG_INVALID pdt.score_weights.{name} must be finite and >= 0");
            }
        }
        for (strategy, p) in &self.strategies {
            if !(0.0..=1.0).contains(&p.historical_success_rate) {
                bail!(
                    "CONFIG_INVALID strategies.{strategy}.historical_success_rate must be in [0, 1]"
                );
            }
        }
        if self.database.url_env.trim().is_empty() {
            bail!("CONFIG_INVALID database.url_env must name an env var");
        }
        Ok(())
    }

    /// Profile for `strategy`, falling back to the `default` entry and then to
    /// built-in defaults.
    pub fn profile(&self, strategy: &str) -> StrategyProfileSettings {
        self.strategies
            .get(strategy)
            .or_else(|| self.strategies.get(DEFAULT_PROFILE_KEY))
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// pdt:
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdtSettings {
    #[serde(default = "default_weekly_cap")]
    pub weekly_cap: u32,
    /// Zone in which "Monday 00:00" is evaluated.
    #[serde(default = "default_reference_tz")]
    pub reference_tz: Tz,
    /// Slots held back for stop-loss exits.
    #[serde(default)]
    pub emergency_reserve: u32,
    /// Closed weeks retained in memory for status reporting.
    #[serde(default = "default_history_weeks")]
    pub history_weeks: usize,
    #[serde(default)]
    pub score_weights: ScoreWeightSettings,
}

impl Default for PdtSettings {
    fn default() -> Self {
        Self {
            weekly_cap: default_weekly_cap(),
            reference_tz: default_reference_tz(),
            emergency_reserve: 0,
            history_weeks: default_history_weeks(),
            score_weights: ScoreWeightSettings::default(),
        }
    }
}

/// Regulatory ceiling. Config may lower the weekly cap, never raise it.
pub const MAX_WEEKLY_CAP: u32 = 3;

fn default_weekly_cap() -> u32 {
    MAX_WEEKLY_CAP
}

fn default_reference_tz() -> Tz {
    chrono_tz::America::New_York
}

fn default_history_weeks() -> usize {
    12
}

/// Exponents applied to each scoring factor. All 1.0 = plain product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeightSettings {
    #[serde(default = "one")]
    pub confidence: f64,
    #[serde(default = "one")]
    pub profit: f64,
    #[serde(default = "one")]
    pub history: f64,
}

impl Default for ScoreWeightSettings {
    fn default() -> Self {
        Self {
            confidence: 1.0,
            profit: 1.0,
            history: 1.0,
        }
    }
}

fn one() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// strategies:
// ---------------------------------------------------------------------------

/// What a strategy wants done when no day-trade slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WaitModeSetting {
    #[default]
    Queue,
    ConvertToSwing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfileSettings {
    #[serde(default = "default_success_rate")]
    pub historical_success_rate: f64,
    #[serde(default)]
    pub wait_mode: WaitModeSetting,
}

impl Default for StrategyProfileSettings {
    fn default() -> Self {
        Self {
            historical_success_rate: DEFAULT_HISTORICAL_SUCCESS_RATE,
            wait_mode: WaitModeSetting::Queue,
        }
    }
}

fn default_success_rate() -> f64 {
    DEFAULT_HISTORICAL_SUCCESS_RATE
}

// ---------------------------------------------------------------------------
// database:
// ---------------------------------------------------------------------------

/// Only the env var NAME lives in config; see [`crate::secrets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_env")]
    pub url_env: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url_env: default_url_env(),
        }
    }
}

fn default_url_env() -> String {
    "ELP_DATABASE_URL".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = EngineConfig::from_json(&serde_json::json!({})).unwrap();
        assert_eq!(cfg.pdt.weekly_cap, 3);
        assert_eq!(cfg.pdt.reference_tz, chrono_tz::America::New_York);
        assert_eq!(cfg.pdt.emergency_reserve, 0);
        assert_eq!(cfg.pdt.score_weights, ScoreWeightSettings::default());
        assert_eq!(cfg.database.url_env, "ELP_DATABASE_URL");
    }

    #[test]
    fn profile_falls_back_to_default_entry() {
        let cfg = EngineConfig::from_json(&serde_json::json!({
            "strategies": {
                "default": { "historical_success_rate": 0.6 },
                "solar_flare": { "historical_success_rate": 0.7, "wait_mode": "convert_to_swing" }
            }
        }))
        .unwrap();

        let sf = cfg.profile("solar_flare");
        assert_eq!(sf.historical_success_rate, 0.7);
        assert_eq!(sf.wait_mode, WaitModeSetting::ConvertToSwing);

        let other = cfg.profile("momentum");
        assert_eq!(other.historical_success_rate, 0.6);
        assert_eq!(other.wait_mode, WaitModeSetting::Queue);
    }

    #[test]
    fn profile_without_default_entry_uses_builtin() {
        let cfg = EngineConfig::default();
        assert_eq!(
            cfg.profile("anything").historical_success_rate,
            DEFAULT_HISTORICAL_SUCCESS_RATE
        );
    }

    #[test]
    fn reserve_must_leave_room_for_ordinary_trades() {
        let err = EngineConfig::from_json(&serde_json::json!({
            "pdt": { "weekly_cap": 3, "emergency_reserve": 3 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("emergency_reserve"));
    }

    #[test]
    fn weekly_cap_cannot_exceed_regulatory_limit() {
        let err = EngineConfig::from_json(&serde_json::json!({
            "pdt": { "weekly_cap": 5 }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("CONFIG_INVALID pdt.weekly_cap"));

        let lowered = EngineConfig::from_json(&serde_json::json!({
            "pdt": { "weekly_cap": 2, "emergency_reserve": 1 }
        }))
        .unwrap();
        assert_eq!(lowered.pdt.weekly_cap, 2);
    }

    #[test]
    fn bad_timezone_is_rejected() {
        assert!(EngineConfig::from_json(&serde_json::json!({
            "pdt": { "reference_tz": "Mars/Olympus_Mons" }
        }))
        .is_err());
    }

    #[test]
    fn negative_weight_is_rejected() {
        assert!(EngineConfig::from_json(&serde_json::json!({
            "pdt": { "score_weights": { "profit": -1.0 } }
        }))
        .is_err());
    }

    #[test]
    fn out_of_range_success_rate_is_rejected() {
        assert!(EngineConfig::from_json(&serde_json::json!({
            "strategies": { "x": { "historical_success_rate": 1.5 } }
        }))
        .is_err());
    }
}
