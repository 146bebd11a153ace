//! Helpers that keep secrets and oversized payloads out of log lines.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_LOG_CHARS: usize = 240;

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(authorization|api[_-]?key|token|bearer)(["']?\s*[:=]\s*["']?|\s+)([A-Za-z0-9_\-\.]{8,})"#)
        .expect("secret redaction pattern is valid")
});

/// Masks anything that looks like a credential assignment.
pub fn redact_text_for_logs(text: &str) -> String {
    SECRET_PATTERN
        .replace_all(text, "${1}${2}[REDACTED]")
        .into_owned()
}

/// Redacts, flattens newlines and truncates text for a single log line.
pub fn preview_for_logs(text: &str) -> String {
    let flat = redact_text_for_logs(text).replace('\n', "\\n");
    if flat.chars().count() > MAX_LOG_CHARS {
        let cut: String = flat.chars().take(MAX_LOG_CHARS).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}
