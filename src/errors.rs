use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("CLI_INVALID: {0}")]
    Cli(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("GENERATION_FAILED: {0}")]
    Generation(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    /// Diagnostic text without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Config(message)
            | Self::Cli(message)
            | Self::Io(message)
            | Self::Generation(message)
            | Self::Internal(message) => message,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
