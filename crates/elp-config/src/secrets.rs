//! Runtime secret resolution.
//!
//! Config stores only env var NAMES. Values are read here, once, at startup,
//! and error messages reference the NAME, never the value.

use anyhow::{bail, Result};

use crate::EngineConfig;

/// Resolve the Postgres URL from the env var named in `database.url_env`.
pub fn resolve_database_url(cfg: &EngineConfig) -> Result<String> {
    resolve_with(cfg, |name| std::env::var(name).ok())
}

fn resolve_with(cfg: &EngineConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let name = cfg.database.url_env.as_str();
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => bail!("SECRET_EMPTY env var {name} is set but empty"),
        None => bail!("SECRET_MISSING env var {name} is not set"),
    }
}
