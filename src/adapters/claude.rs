use crate::models::{OutputFormat, ResultRecord, Usage};
use serde_json::{Map, Value};

pub const ERROR_PREFIX: &str = "[claude-code-cli]";

const STREAM_CONTENT_KEYS: [&str; 3] = ["content", "text", "response"];

/// Decodes captured stdout. Never fails: output that is not the expected
/// JSON shape becomes plain-text content.
pub fn parse_output(raw: &str, format: OutputFormat) -> ResultRecord {
    match format {
        OutputFormat::FullJson => parse_full_json(raw),
        OutputFormat::StreamJson => parse_stream_json(raw),
    }
}

pub fn parse_full_json(raw: &str) -> ResultRecord {
    let Some(payload) = parse_json_object(raw) else {
        return plain_text_fallback(raw);
    };

    let session_id = string_field(&payload, "session_id");

    if payload.get("is_error").and_then(Value::as_bool).unwrap_or(false) {
        let reason = string_field(&payload, "result")
            .or_else(|| string_field(&payload, "error"))
            .or_else(|| string_field(&payload, "subtype"))
            .unwrap_or_else(|| "unknown error".to_string());
        tracing::error!(session_id = ?session_id, reason = %reason, "CLI reported an error payload");
        return ResultRecord::failure_with_session(
            format!("{} CLI reported error: {}", ERROR_PREFIX, reason),
            session_id,
        );
    }

    let content = match payload.get("result") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let record = ResultRecord {
        content,
        usage: usage_field(&payload),
        session_id,
        cost_usd: cost_field(&payload),
        num_turns: turns_field(&payload),
        error: None,
    };
    tracing::debug!(chars = record.content.len(), usage = ?record.usage, "parsed full-json output");
    record
}

pub fn parse_stream_json(raw: &str) -> ResultRecord {
    let Some(last_line) = raw.lines().rev().find(|line| !line.trim().is_empty()) else {
        return ResultRecord::default();
    };

    let Some(payload) = parse_json_object(last_line) else {
        return plain_text_fallback(raw);
    };

    let content = STREAM_CONTENT_KEYS.iter().find_map(|key| {
        payload
            .get(*key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string)
    });
    let content = match content {
        Some(content) => content,
        None => {
            tracing::warn!(
                keys = ?payload.keys().collect::<Vec<_>>(),
                "stream-json terminal line has no content field; using raw output"
            );
            raw.trim().to_string()
        }
    };

    let record = ResultRecord {
        content,
        usage: usage_field(&payload),
        session_id: string_field(&payload, "session_id"),
        cost_usd: cost_field(&payload),
        num_turns: turns_field(&payload),
        error: None,
    };
    tracing::debug!(chars = record.content.len(), usage = ?record.usage, "parsed stream-json output");
    record
}

fn plain_text_fallback(raw: &str) -> ResultRecord {
    let content = raw.trim();
    tracing::debug!(chars = content.len(), "using plain text output");
    ResultRecord::text(content)
}

fn parse_json_object(raw: &str) -> Option<Map<String, Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => {
            tracing::debug!("output is JSON but not an object");
            None
        }
        Err(error) => {
            tracing::debug!(error = %error, "output is not JSON");
            None
        }
    }
}

fn string_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

fn cost_field(payload: &Map<String, Value>) -> Option<f64> {
    payload
        .get("total_cost_usd")
        .or_else(|| payload.get("cost_usd"))
        .and_then(Value::as_f64)
}

fn turns_field(payload: &Map<String, Value>) -> Option<u32> {
    payload
        .get("num_turns")
        .and_then(Value::as_u64)
        .and_then(|turns| u32::try_from(turns).ok())
}

fn usage_field(payload: &Map<String, Value>) -> Usage {
    let Some(usage) = payload.get("usage").and_then(Value::as_object) else {
        return Usage::default();
    };
    let counter = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    Usage {
        input_tokens: counter("input_tokens"),
        output_tokens: counter("output_tokens"),
        cache_read_input_tokens: counter("cache_read_input_tokens"),
        cache_creation_input_tokens: counter("cache_creation_input_tokens"),
    }
}
