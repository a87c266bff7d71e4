use once_cell::sync::Lazy;
use regex::Regex;

static SECRET_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r#"(?i)(api[_-]?key|token|secret|password)\s*[:=]\s*["']?[A-Za-z0-9_\-\.]{6,}["']?"#)
                .expect("valid regex"),
            "${1}=[REDACTED]",
        ),
        (
            Regex::new(r"\bsk-[A-Za-z0-9_\-]{20,}").expect("valid regex"),
            "[REDACTED_API_KEY]",
        ),
        (
            Regex::new(r"\bAKIA[0-9A-Z]{16}\b").expect("valid regex"),
            "[REDACTED_ACCESS_KEY]",
        ),
        (
            Regex::new(r"\b[A-Fa-f0-9]{32,}\b").expect("valid regex"),
            "[REDACTED_HEX]",
        ),
    ]
});

static SECRET_FLAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^--?([a-z0-9]+-)*(key|token|secret|password)$").expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionResult {
    pub content: String,
    pub redaction_count: usize,
}

/// Masks credentials before argv or CLI diagnostics reach the logs.
#[derive(Debug, Default, Clone)]
pub struct Redactor {
    aggressive: bool,
}

impl Redactor {
    pub fn new(aggressive: bool) -> Self {
        Self { aggressive }
    }

    pub fn redact(&self, input: &str) -> RedactionResult {
        if input.is_empty() {
            return RedactionResult {
                content: String::new(),
                redaction_count: 0,
            };
        }

        let mut result = input.to_string();
        let mut redaction_count = 0usize;

        if self.aggressive {
            result = result
                .split(' ')
                .map(|token| {
                    if token.len() > 48 && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                        redaction_count += 1;
                        "[REDACTED_LONG_TOKEN]".to_string()
                    } else {
                        token.to_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
        }

        for (pattern, replacement) in SECRET_PATTERNS.iter() {
            let matches = pattern.find_iter(&result).count();
            if matches == 0 {
                continue;
            }
            redaction_count += matches;
            result = pattern.replace_all(&result, *replacement).into_owned();
        }

        RedactionResult {
            content: result,
            redaction_count,
        }
    }

    /// Space-joined argv with the value after any credential-looking flag
    /// masked.
    pub fn redact_argv(&self, argv: &[String]) -> String {
        let mut parts = Vec::with_capacity(argv.len());
        let mut mask_next = false;
        for arg in argv {
            if mask_next {
                mask_next = false;
                parts.push("[REDACTED]".to_string());
                continue;
            }
            if SECRET_FLAG.is_match(arg) {
                mask_next = true;
                parts.push(arg.clone());
                continue;
            }
            parts.push(self.redact(arg).content);
        }
        parts.join(" ")
    }
}
