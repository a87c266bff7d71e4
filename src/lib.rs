pub mod adapters;
pub mod errors;
pub mod models;
pub mod process;
pub mod redaction;
pub mod runner;
pub mod session;
pub mod settings;

pub use crate::adapters::ValidatedCommand;
pub use crate::errors::{AppError, AppResult};
pub use crate::models::{
    AdapterConfig, CallRequest, ChatMessage, OutputFormat, PromptInput, RequestParams, ResultRecord, Usage,
};
pub use crate::process::{CommandRunner, ProcessOutcome, TokioCommandRunner};
pub use crate::runner::ClaudeCliAdapter;
pub use crate::settings::AdapterSettings;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs a JSON subscriber writing to `<log_dir>/adapter.log`, rotated
/// daily. Level comes from `RUST_LOG`, defaulting to `info`. Hosts with
/// their own subscriber should skip this.
pub fn init_logging(log_dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "adapter.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}
