use crate::models::AdapterConfig;

pub const RESUME_FLAG: &str = "--resume";
pub const MODEL_FLAG: &str = "--model";
pub const MAX_TOKENS_FLAG: &str = "--max-tokens";
pub const TEMPERATURE_FLAG: &str = "--temperature";
pub const MAX_TURNS_FLAG: &str = "--max-turns";
pub const PROJECT_FLAG: &str = "-p";
pub const OUTPUT_FORMAT_FLAG: &str = "--output-format";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOverrides {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub max_turns: Option<u32>,
    pub resume_session_id: Option<String>,
}

/// Builds the full argv, executable first. Pure: the same inputs always
/// produce the same vector.
pub fn build_argv(config: &AdapterConfig, overrides: &CommandOverrides) -> Vec<String> {
    let mut args = vec![config.cli_path.clone()];

    if let Some(session_id) = trimmed(overrides.resume_session_id.as_deref()) {
        args.push(RESUME_FLAG.to_string());
        args.push(session_id.to_string());
    }

    if let Some(model) = trimmed(overrides.model.as_deref()).or_else(|| trimmed(config.model.as_deref())) {
        args.push(MODEL_FLAG.to_string());
        args.push(model.to_string());
    }

    if let Some(max_tokens) = overrides.max_tokens {
        args.push(MAX_TOKENS_FLAG.to_string());
        args.push(max_tokens.to_string());
    }

    if let Some(temperature) = overrides.temperature {
        args.push(TEMPERATURE_FLAG.to_string());
        // Debug keeps the decimal point for whole values (`1.0`, not `1`).
        args.push(format!("{:?}", temperature));
    }

    if let Some(max_turns) = overrides.max_turns.filter(|turns| *turns > 0) {
        args.push(MAX_TURNS_FLAG.to_string());
        args.push(max_turns.to_string());
    }

    if let Some(project) = trimmed(config.project_path.as_deref()) {
        args.push(PROJECT_FLAG.to_string());
        args.push(project.to_string());
    }

    args.extend(strip_output_format(split_extra_args(config.effective_extra_args())));

    // Appended last so it wins over anything the caller supplied.
    args.push(OUTPUT_FORMAT_FLAG.to_string());
    args.push(config.output_format.cli_value().to_string());

    args
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn split_extra_args(raw: &str) -> Vec<String> {
    match shlex::split(raw) {
        Some(tokens) => tokens,
        None => {
            tracing::warn!(extra_args = %raw, "extra arguments are not valid shell words; splitting on whitespace");
            raw.split_whitespace().map(ToString::to_string).collect()
        }
    }
}

/// Drops `--output-format <value>` and `--output-format=<value>` tokens.
pub fn strip_output_format(tokens: Vec<String>) -> Vec<String> {
    let prefix = format!("{}=", OUTPUT_FORMAT_FLAG);
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        if token == OUTPUT_FORMAT_FLAG {
            let _ = iter.next_if(|value| !value.starts_with('-'));
            continue;
        }
        if token.starts_with(&prefix) {
            continue;
        }
        out.push(token);
    }
    out
}
