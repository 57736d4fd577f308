//! elp-config
//!
//! Layered YAML configuration for the allocator.
//!
//! Documents are overlaid in order (later documents win, maps merge key by
//! key), literal secrets are refused, and the merged tree is hashed so every
//! run can record exactly which configuration it was started with. The typed
//! view the engine actually consumes lives in [`engine`].

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

pub mod engine;
pub mod secrets;

pub use engine::{
    DatabaseSettings, EngineConfig, PdtSettings, ScoreWeightSettings, StrategyProfileSettings,
    WaitModeSetting,
};
pub use secrets::resolve_database_url;

/// String values starting with any of these abort loading with
/// `CONFIG_SECRET_DETECTED`. Config carries env var names, never values.
const SECRET_MARKERS: &[&str] = &[
    "postgres://",
    "postgresql://",
    "-----BEGIN",
    "AKIA",
    "sk-",
    "sk_live",
    "sk_test",
    "ghp_",
    "glpat-",
    "xoxb-",
];

/// Shorter strings are never treated as secrets.
const MIN_SECRET_LEN: usize = 8;

/// Subtrees the engine reads. Leaves outside them are reported by
/// [`report_unused_keys`].
pub const CONSUMED_POINTERS: &[&str] = &["/pdt", "/strategies", "/database"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed view of the merged document.
    pub fn engine(&self) -> Result<EngineConfig> {
        EngineConfig::from_json(&self.config_json)
    }
}

/// Read and overlay YAML files in order.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {layer}: invalid yaml"))?;
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("config layer {layer}: not representable as json"))?;
        overlay(&mut merged, doc);
    }

    refuse_secret_literals(&merged)?;

    let canonical_json =
        serde_json::to_string(&sorted(&merged)).context("serialize canonical config")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Merge `top` into `base`. Maps merge recursively; anything else replaces.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (key, top_val) in top_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, top_val),
                    None => {
                        base_map.insert(key, top_val);
                    }
                }
            }
        }
        (slot, top) => *slot = top,
    }
}

/// Copy of `v` with every map's keys in sorted order, so the hash does not
/// depend on the order keys were written in.
fn sorted(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        scalar => scalar.clone(),
    }
}

fn refuse_secret_literals(v: &Value) -> Result<()> {
    for (pointer, leaf) in leaves(v) {
        let Some(s) = leaf.as_str().map(str::trim) else {
            continue;
        };
        if s.len() >= MIN_SECRET_LEN && SECRET_MARKERS.iter().any(|m| s.starts_with(m)) {
            bail!("CONFIG_SECRET_DETECTED leaf={pointer} value=REDACTED");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unused keys
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct UnusedKeyReport {
    /// Leaf pointers outside [`CONSUMED_POINTERS`], sorted.
    pub unused: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused.is_empty()
    }
}

/// Report config leaves nothing reads (typos, stale keys).
/// With [`UnusedKeyPolicy::Fail`] a dirty report is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut unused: Vec<String> = leaves(config_json)
        .into_iter()
        .map(|(pointer, _)| pointer)
        .filter(|p| !CONSUMED_POINTERS.iter().any(|c| pointer_within(c, p)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport { unused };
    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report.unused.iter().take(12).map(String::as_str).collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused key(s): {}",
            report.unused.len(),
            shown.join(", ")
        );
    }
    Ok(report)
}

/// `/a/b` covers `/a/b` and `/a/b/c`, not `/a/bc`.
fn pointer_within(subtree: &str, pointer: &str) -> bool {
    match pointer.strip_prefix(subtree) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Every scalar leaf with its JSON pointer. An empty map or array counts as
/// a leaf so a stray `foo: {}` is still reported.
fn leaves(root: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), root)];
    while let Some((pointer, v)) = stack.pop() {
        match v {
            Value::Object(map) if !map.is_empty() => {
                for (k, child) in map {
                    let token = k.replace('~', "~0").replace('/', "~1");
                    stack.push((format!("{pointer}/{token}"), child));
                }
            }
            Value::Array(items) if !items.is_empty() => {
                for (i, child) in items.iter().enumerate() {
                    stack.push((format!("{pointer}/{i}"), child));
                }
            }
            _ => {
                let pointer = if pointer.is_empty() { "/".to_string() } else { pointer };
                out.push((pointer, v));
            }
        }
    }
    out
}
