//! Modular configuration loader.
//!
//! Supports splitting configuration across files in the config directory:
//! - `config.json` - Core configuration (server, logging, data paths)
//! - `trading.json` - Detector, cycle and orchestrator tuning
//!
//! `trading.json` is deep-merged into the `trading` key of `config.json`,
//! so a tuning file only needs the thresholds it changes.

use anyhow::{Context, Result};
use serde_json::map::Entry;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::config_dir;

/// Files read from the config directory, in merge order.
pub const CONFIG_FILES: &[&str] = &["config.json", "trading.json"];

/// Parse a JSON file. A missing file is `None`, unreadable or invalid JSON is an error.
fn read_json(path: &Path) -> Result<Option<Value>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    serde_json::from_str(&text)
        .map(Some)
        .with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Overlay `patch` onto `base`. Objects merge key by key; anything else replaces.
fn merge_json(base: &mut Value, patch: Value) {
    let Value::Object(patch_map) = patch else {
        *base = patch;
        return;
    };
    let Value::Object(base_map) = base else {
        *base = Value::Object(patch_map);
        return;
    };
    for (key, value) in patch_map {
        match base_map.entry(key) {
            Entry::Occupied(mut slot) => merge_json(slot.get_mut(), value),
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
        }
    }
}

/// Drop editor metadata such as `$schema` or `_comment` from the top level.
fn strip_meta(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with(['$', '_']))
                .collect(),
        ),
        other => other,
    }
}

/// Read `config.json` and fold `trading.json` into its `trading` section.
///
/// Environment overrides are applied later by [`crate::config::Config`].
pub fn load_modular_config(dir: Option<PathBuf>) -> Result<Value> {
    let dir = dir.unwrap_or_else(config_dir);
    tracing::debug!(dir = %dir.display(), "Loading modular config");

    let mut root = read_json(&dir.join("config.json"))?.unwrap_or_else(|| json!({}));

    if let Some(tuning) = read_json(&dir.join("trading.json"))? {
        let mut patch = json!({});
        patch["trading"] = strip_meta(tuning);
        merge_json(&mut root, patch);
        tracing::debug!("Merged trading.json");
    }

    Ok(root)
}

/// Which of [`CONFIG_FILES`] are present.
pub fn check_modular_files(dir: Option<PathBuf>) -> Vec<(String, bool)> {
    let dir = dir.unwrap_or_else(config_dir);
    CONFIG_FILES
        .iter()
        .map(|name| (name.to_string(), dir.join(name).is_file()))
        .collect()
}
