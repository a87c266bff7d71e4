use crate::errors::{AppError, AppResult};
use crate::models::{AdapterConfig, OutputFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ENV_CLI_PATH: &str = "CLAUDE_CLI_PATH";
pub const ENV_PROJECT: &str = "CLAUDE_CLI_PROJECT";
pub const ENV_MODEL: &str = "CLAUDE_CLI_MODEL";
pub const ENV_EXTRA_ARGS: &str = "CLAUDE_CLI_EXTRA_ARGS";
pub const ENV_TIMEOUT: &str = "CLAUDE_CLI_TIMEOUT";
pub const ENV_OUTPUT_FORMAT: &str = "CLAUDE_CLI_OUTPUT_FORMAT";

/// Host-facing configuration source. Every field is optional; unset fields
/// fall back to [`AdapterConfig::default`] when resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterSettings {
    pub cli_path: Option<String>,
    pub project_path: Option<String>,
    pub model: Option<String>,
    pub extra_args: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub output_format: Option<OutputFormat>,
}

impl AdapterSettings {
    /// Reads the `CLAUDE_CLI_*` variables from the supplied pairs. Pass
    /// `std::env::vars()` to use the process environment.
    pub fn from_env_vars<I, K, V>(vars: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut settings = Self::default();
        for (key, value) in vars {
            let value = value.into();
            match key.as_ref() {
                ENV_CLI_PATH => settings.cli_path = non_empty(value),
                ENV_PROJECT => settings.project_path = non_empty(value),
                ENV_MODEL => settings.model = non_empty(value),
                ENV_EXTRA_ARGS => settings.extra_args = non_empty(value),
                ENV_TIMEOUT => {
                    settings.timeout_seconds = match non_empty(value) {
                        Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                            AppError::Config(format!("{} must be a whole number of seconds, got '{}'", ENV_TIMEOUT, raw))
                        })?),
                        None => None,
                    }
                }
                ENV_OUTPUT_FORMAT => {
                    settings.output_format = match non_empty(value) {
                        Some(raw) => Some(raw.parse::<OutputFormat>()?),
                        None => None,
                    }
                }
                _ => {}
            }
        }
        Ok(settings)
    }

    pub fn from_yaml_str(raw: &str) -> AppResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Overlays `update` onto `self`; fields unset in `update` keep their
    /// current value.
    pub fn merge(self, update: Self) -> AppResult<Self> {
        let mut merged = serde_json::to_value(self)?;
        merge_json_skip_null(&mut merged, serde_json::to_value(update)?);
        Ok(serde_json::from_value(merged)?)
    }

    pub fn resolve(&self) -> AppResult<AdapterConfig> {
        let defaults = AdapterConfig::default();
        let config = AdapterConfig {
            cli_path: self
                .cli_path
                .clone()
                .and_then(non_empty)
                .unwrap_or(defaults.cli_path),
            project_path: self.project_path.clone().and_then(non_empty),
            model: self.model.clone().and_then(non_empty),
            extra_args: self.extra_args.clone().and_then(non_empty),
            timeout: self
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            output_format: self.output_format.unwrap_or(defaults.output_format),
        };
        config.validate()?;
        Ok(config)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn merge_json_skip_null(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json_skip_null(
                    target_map.entry(key).or_insert(serde_json::Value::Null),
                    value,
                );
            }
        }
        (_, serde_json::Value::Null) => {}
        (target, update) => {
            *target = update;
        }
    }
}
