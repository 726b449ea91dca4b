//! Settings loading from configuration files.
//!
//! [`Settings`] can be read from TOML or JSON. Keys missing from the file
//! keep their defaults, and environment variables override both.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `NUNCHUCKS_BASE_PATH` | `base_path` |
//! | `NUNCHUCKS_OUTPUT_DIR` | `output_dir` |
//! | `NUNCHUCKS_TEMPLATE_EXTENSIONS` | `template_extensions` (comma-separated) |
//! | `NUNCHUCKS_MAX_RENDER_DEPTH` | `max_render_depth` |
//! | `NUNCHUCKS_LOG_LEVEL` | `log_level` |
//! | `NUNCHUCKS_DEBUG` | `debug` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use nunchucks_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file("nunchucks.toml").unwrap();
//! let settings = settings_loader::from_file_with_env("nunchucks.json").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::NunchucksError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, NunchucksError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| NunchucksError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, NunchucksError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, NunchucksError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| NunchucksError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, NunchucksError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a file, picking the format from its extension
/// (`.json` is JSON, anything else is TOML), then applies environment
/// overrides.
pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Settings, NunchucksError> {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let mut settings = if is_json {
        from_json_file(path)?
    } else {
        from_toml_file(path)?
    };
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `NUNCHUCKS_*` environment variable overrides to `settings`.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Applies overrides using an arbitrary key lookup.
///
/// Unparseable numeric values are ignored. `NUNCHUCKS_DEBUG` accepts
/// "true", "1" and "yes"; anything else turns debug off.
pub fn apply_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("NUNCHUCKS_BASE_PATH") {
        settings.base_path = PathBuf::from(val);
    }

    if let Some(val) = lookup("NUNCHUCKS_OUTPUT_DIR") {
        settings.output_dir = PathBuf::from(val);
    }

    if let Some(val) = lookup("NUNCHUCKS_TEMPLATE_EXTENSIONS") {
        settings.template_extensions = val
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(val) = lookup("NUNCHUCKS_MAX_RENDER_DEPTH") {
        if let Ok(depth) = val.trim().parse::<usize>() {
            settings.max_render_depth = depth;
        }
    }

    if let Some(val) = lookup("NUNCHUCKS_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = lookup("NUNCHUCKS_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, NunchucksError> {
    std::fs::read_to_string(path).map_err(|e| {
        NunchucksError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(
    value: serde_json::Value,
    format: &str,
) -> Result<Settings, NunchucksError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        NunchucksError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        NunchucksError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. `override_val` wins.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
