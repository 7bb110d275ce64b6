use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::defaults::default_config;
use crate::errors::ConfigError;
use crate::model::{ConfigSource, EnforcementConfig};

const ENV_PREFIX: &str = "WARDEN__";
const ENV_JSON: &str = "WARDEN_CONFIG_OVERRIDE_JSON";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

/// Builtin defaults, then `path` (YAML) if it exists, then the environment.
pub fn load_config(path: Option<&Path>) -> Result<EnforcementConfig, ConfigError> {
    let mut options = LoadOptions {
        include_env: true,
        ..LoadOptions::default()
    };
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    load_config_with_options(&options)
}

pub fn load_config_with_options(options: &LoadOptions) -> Result<EnforcementConfig, ConfigError> {
    let mut config = default_config();
    bootstrap_builtin_provenance(&mut config)?;

    for path in &options.paths {
        if path.exists() {
            let overlays = overlays_from_file(path)?;
            apply_overlays(&mut config, overlays)?;
        } else {
            debug!(path = %path.display(), "config file not found, skipping");
        }
    }

    if options.include_env {
        let overlays = overlays_from_env()?;
        apply_overlays(&mut config, overlays)?;
    }

    Ok(config)
}

struct ConfigOverlay {
    path: String,
    value: Value,
    source: ConfigSource,
}

fn apply_overlays(
    config: &mut EnforcementConfig,
    overlays: Vec<ConfigOverlay>,
) -> Result<(), ConfigError> {
    for overlay in overlays {
        apply_override_to_config(config, &overlay.path, &overlay.value, overlay.source)?;
    }
    Ok(())
}

fn overlays_from_file(path: &Path) -> Result<Vec<ConfigOverlay>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    let json_value =
        serde_json::to_value(yaml_value).map_err(|err| ConfigError::Invalid(err.to_string()))?;
    Ok(flatten_value(json_value, None, ConfigSource::File))
}

fn overlays_from_env() -> Result<Vec<ConfigOverlay>, ConfigError> {
    let mut overlays = Vec::new();
    let mut vars: Vec<(String, String)> = env::vars()
        .filter(|(key, _)| key.starts_with(ENV_PREFIX))
        .collect();
    vars.sort();
    for (key, raw) in vars {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(|segment| segment.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(".");
        if path.is_empty() {
            continue;
        }
        overlays.push(ConfigOverlay {
            path,
            value: parse_env_value(&raw),
            source: ConfigSource::Env,
        });
    }

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json)
                .map_err(|err| ConfigError::Invalid(format!("{ENV_JSON}: {err}")))?;
            overlays.extend(flatten_value(json_value, None, ConfigSource::Env));
        }
    }

    Ok(overlays)
}

fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    Value::String(raw.to_string())
}

/// Objects are flattened into dotted paths; arrays and scalars are leaves.
fn flatten_value(value: Value, prefix: Option<String>, source: ConfigSource) -> Vec<ConfigOverlay> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let segment = key.trim().to_ascii_lowercase();
                let next = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{prefix}.{segment}"),
                    _ => segment,
                };
                result.extend(flatten_value(value, Some(next), source));
            }
            result
        }
        other => match prefix {
            Some(path) => vec![ConfigOverlay {
                path,
                value: other,
                source,
            }],
            None => Vec::new(),
        },
    }
}

fn bootstrap_builtin_provenance(config: &mut EnforcementConfig) -> Result<(), ConfigError> {
    let sections = [
        ("enforcer_cache", serde_json::to_value(&config.enforcer_cache)),
        (
            "thing_policy_id_cache",
            serde_json::to_value(&config.thing_policy_id_cache),
        ),
        ("correlation_cache", serde_json::to_value(&config.correlation_cache)),
        ("dispatcher", serde_json::to_value(&config.dispatcher)),
        ("logging", serde_json::to_value(&config.logging)),
    ];
    let mut overlays = Vec::new();
    for (name, value) in sections {
        let value = value.map_err(|err| ConfigError::Invalid(err.to_string()))?;
        overlays.extend(flatten_value(value, Some(name.into()), ConfigSource::Builtin));
    }
    for overlay in overlays {
        config.set_provenance(&overlay.path, overlay.source);
    }
    Ok(())
}

pub(crate) fn apply_override_to_config(
    config: &mut EnforcementConfig,
    path: &str,
    value: &Value,
    source: ConfigSource,
) -> Result<(), ConfigError> {
    match path {
        "enforcer_cache.max_entries" => {
            config.enforcer_cache.max_entries = to_positive_usize(path, value)?
        }
        "enforcer_cache.ttl_ms" => config.enforcer_cache.ttl_ms = to_u64(path, value)?,
        "thing_policy_id_cache.max_entries" => {
            config.thing_policy_id_cache.max_entries = to_positive_usize(path, value)?
        }
        "thing_policy_id_cache.ttl_ms" => {
            config.thing_policy_id_cache.ttl_ms = to_u64(path, value)?
        }
        "correlation_cache.default_ttl_ms" => {
            config.correlation_cache.default_ttl_ms = to_u64(path, value)?
        }
        "correlation_cache.max_entries" => {
            config.correlation_cache.max_entries = to_positive_usize(path, value)?
        }
        "dispatcher.ask_timeout_ms" => config.dispatcher.ask_timeout_ms = to_u64(path, value)?,
        "dispatcher.max_timeout_ms" => {
            config.dispatcher.max_timeout_ms = to_positive_u64(path, value)?
        }
        "dispatcher.always_visible_fields" => {
            config.dispatcher.always_visible_fields = to_string_list(path, value)?
        }
        "logging.level" => config.logging.level = to_string(path, value)?,
        "logging.json" => config.logging.json = to_bool(path, value)?,
        other => return Err(ConfigError::UnsupportedPath(other.to_string())),
    }
    config.set_provenance(path, source);
    Ok(())
}

fn invalid(path: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn to_u64(path: &str, value: &Value) -> Result<u64, ConfigError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| invalid(path, "expected a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| invalid(path, format!("'{s}' is not an integer"))),
        _ => Err(invalid(path, "expected an integer")),
    }
}

fn to_positive_u64(path: &str, value: &Value) -> Result<u64, ConfigError> {
    match to_u64(path, value)? {
        0 => Err(invalid(path, "must be greater than zero")),
        parsed => Ok(parsed),
    }
}

fn to_positive_usize(path: &str, value: &Value) -> Result<usize, ConfigError> {
    let parsed = to_u64(path, value)?;
    if parsed == 0 {
        return Err(invalid(path, "must be greater than zero"));
    }
    usize::try_from(parsed).map_err(|_| invalid(path, "out of range"))
}

fn to_bool(path: &str, value: &Value) -> Result<bool, ConfigError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| invalid(path, format!("'{s}' is not a boolean"))),
        _ => Err(invalid(path, "expected a boolean")),
    }
}

fn to_string(path: &str, value: &Value) -> Result<String, ConfigError> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(invalid(path, "expected a non-empty string")),
    }
}

fn to_string_list(path: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| to_string(path, item))
            .collect(),
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect()),
        _ => Err(invalid(path, "expected a list of field names")),
    }
}
