use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 180;

#[cfg(windows)]
pub const DEFAULT_CLI_PATH: &str = "claude.cmd";
#[cfg(not(windows))]
pub const DEFAULT_CLI_PATH: &str = "claude";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    FullJson,
    StreamJson,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullJson => "full-json",
            Self::StreamJson => "stream-json",
        }
    }

    /// Value passed to the CLI's `--output-format` flag.
    pub fn cli_value(self) -> &'static str {
        match self {
            Self::FullJson => "json",
            Self::StreamJson => "stream-json",
        }
    }

    /// Extra arguments used when the configuration leaves them unset.
    /// stream-json needs `--verbose` alongside `--print`.
    pub fn default_extra_args(self) -> &'static str {
        match self {
            Self::FullJson => "--print",
            Self::StreamJson => "--print --verbose",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full-json" | "json" => Ok(Self::FullJson),
            "stream-json" => Ok(Self::StreamJson),
            other => Err(AppError::Config(format!(
                "Unknown output format '{}'. Expected 'full-json' or 'stream-json'.",
                other
            ))),
        }
    }
}

/// Immutable per-adapter configuration. Hosts build it once, usually through
/// [`crate::settings::AdapterSettings::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    pub cli_path: String,
    pub project_path: Option<String>,
    pub model: Option<String>,
    pub extra_args: Option<String>,
    pub timeout: Duration,
    pub output_format: OutputFormat,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            cli_path: DEFAULT_CLI_PATH.to_string(),
            project_path: None,
            model: None,
            extra_args: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            output_format: OutputFormat::default(),
        }
    }
}

impl AdapterConfig {
    pub fn validate(&self) -> AppResult<()> {
        if self.cli_path.trim().is_empty() {
            return Err(AppError::Cli("CLI path cannot be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(AppError::Config("Timeout must be greater than zero".to_string()));
        }
        if let Some(raw) = &self.extra_args {
            if shlex::split(raw).is_none() {
                return Err(AppError::Config(format!(
                    "Extra arguments are not valid shell words: {}",
                    raw
                )));
            }
        }
        Ok(())
    }

    pub fn effective_extra_args(&self) -> &str {
        self.extra_args
            .as_deref()
            .unwrap_or_else(|| self.output_format.default_extra_args())
    }
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptInput {
    Messages(Vec<ChatMessage>),
    Text(String),
}

/// Per-call overrides. `None` always means "not supplied"; an explicit zero
/// is kept distinct so the command builder can apply its own rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParams {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub max_turns: Option<u32>,
    pub parallel_tasks: Option<bool>,
    pub use_history: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub input: PromptInput,
    pub params: RequestParams,
}

impl CallRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            input: PromptInput::Text(prompt.into()),
            params: RequestParams::default(),
        }
    }

    pub fn messages(messages: Vec<ChatMessage>) -> Self {
        Self {
            input: PromptInput::Messages(messages),
            params: RequestParams::default(),
        }
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
}

impl Usage {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Normalized outcome of one call. When `error` is set, `content` is empty
/// and only `session_id` may accompany it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub content: String,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultRecord {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn failure_with_session(message: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            session_id,
            ..Self::failure(message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
