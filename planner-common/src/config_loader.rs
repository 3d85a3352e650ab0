//! Modular configuration loader.
//!
//! Supports splitting configuration across several files in the config directory:
//! - `config.json` - Core configuration
//! - `planner.json` - Planner section (generators, filters, costs)
//! - `evaluation.json` - Worker pool section
//! - `storage.json` - Best-plan store section
//!
//! Modular files are deep-merged into the matching section of `config.json`.

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::config_dir;

/// Modular files and the config section each one is merged into.
pub const MODULAR_FILES: &[(&str, &str)] = &[
    ("planner.json", "planner"),
    ("evaluation.json", "evaluation"),
    ("storage.json", "storage"),
];

/// Load a JSON file and return its contents as a Value.
/// Returns None if the file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;

    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
pub fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => merge_json(target_value, source_value),
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load modular configuration from the config directory.
///
/// Priority (lowest to highest):
/// 1. `config.json`
/// 2. Modular files, each merged into its own section
/// 3. Environment variables (applied separately by `Config`)
pub fn load_modular_config(dir: Option<PathBuf>) -> Result<Value> {
    let cfg_dir = dir.unwrap_or_else(config_dir);

    let mut config = load_json_file(&cfg_dir.join("config.json"))?
        .unwrap_or(Value::Object(Default::default()));

    tracing::debug!("Loading modular config from {}", cfg_dir.display());

    for (file, section) in MODULAR_FILES {
        let Some(value) = load_json_file(&cfg_dir.join(file))? else {
            continue;
        };

        if let Some(config_obj) = config.as_object_mut() {
            match config_obj.get_mut(*section) {
                Some(existing) => merge_json(existing, value),
                None => {
                    config_obj.insert((*section).to_string(), value);
                }
            }
        }
        tracing::debug!(file = %file, section = %section, "Merged modular config file");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json_nested() {
        let mut target = json!({ "a": { "b": 1, "c": 2 }, "d": 3 });
        merge_json(&mut target, json!({ "a": { "c": 20, "e": 5 } }));
        assert_eq!(target, json!({ "a": { "b": 1, "c": 20, "e": 5 }, "d": 3 }));
    }

    #[test]
    fn test_merge_json_replaces_scalars_and_arrays() {
        let mut target = json!({ "list": [1, 2, 3] });
        merge_json(&mut target, json!({ "list": [9] }));
        assert_eq!(target, json!({ "list": [9] }));
    }

    #[test]
    fn test_missing_directory_yields_empty_object() {
        let dir = tempfile::tempdir().unwrap();
        let value = load_modular_config(Some(dir.path().join("absent"))).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_modular_files_merge_into_sections() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{ "planner": { "max_depth": 4, "name": "core" }, "network": { "port": 5000 } }"#,
        )
        .unwrap();
        fs::write(dir.path().join("planner.json"), r#"{ "max_depth": 2 }"#).unwrap();
        fs::write(dir.path().join("storage.json"), r#"{ "backend": "sqlite" }"#).unwrap();

        let value = load_modular_config(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(value["planner"]["max_depth"], 2);
        assert_eq!(value["planner"]["name"], "core");
        assert_eq!(value["storage"]["backend"], "sqlite");
        assert_eq!(value["network"]["port"], 5000);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let err = load_modular_config(Some(dir.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
