// LogMedic - core/classify.rs
//
// Severity classification of raw, unstructured log lines.
// Core layer: pure string logic, never fails, never panics.
//
// Each source has an ordered rule list matched case-insensitively against
// the raw line; the first match wins. Lines that match nothing fall back to
// a per-source default.

use crate::core::model::{Level, LogSource};
use crate::util::constants::{MAX_MESSAGE_CHARS, TRUNCATION_SUFFIX};
use regex::Regex;
use std::sync::OnceLock;

/// Classify a raw line from `source`.
pub fn parse_level(source: &LogSource, line: &str) -> Level {
    let lower = line.to_lowercase();
    match source {
        LogSource::NginxError => nginx_error_level(&lower),
        LogSource::PhpFpm => php_fpm_level(&lower),
        LogSource::Laravel { .. } => laravel_level(&lower),
        LogSource::NginxAccess => nginx_access_level(line),
    }
}

/// Classify a line whose source is only known by its raw key.
///
/// Keys that do not parse to a known source yield `Level::Unknown`.
pub fn parse_level_for_key(source_key: &str, line: &str) -> Level {
    match source_key.parse::<LogSource>() {
        Ok(source) => parse_level(&source, line),
        Err(_) => Level::Unknown,
    }
}

/// Nginx's error log is error-biased: unlabelled lines count as errors.
fn nginx_error_level(lower: &str) -> Level {
    if lower.contains("[error]") {
        Level::Error
    } else if lower.contains("[warn]") {
        Level::Warning
    } else if lower.contains("[notice]") || lower.contains("[info]") {
        Level::Info
    } else {
        Level::Error
    }
}

fn php_fpm_level(lower: &str) -> Level {
    if lower.contains("fatal") || lower.contains("error") {
        Level::Error
    } else if lower.contains("warning") || lower.contains("warn") {
        Level::Warning
    } else {
        // `notice` and unlabelled lines are both informational.
        Level::Info
    }
}

/// Laravel (Monolog) lines look like `[date] production.ERROR: message`.
fn laravel_level(lower: &str) -> Level {
    const ERROR_MARKERS: &[&str] = &[".error:", ".critical:", ".alert:", ".emergency:"];

    if ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        Level::Error
    } else if lower.contains(".warning:") {
        Level::Warning
    } else if lower.contains(".debug:") {
        Level::Debug
    } else {
        Level::Info
    }
}

/// Access-log lines are classified by the HTTP status that follows the quoted
/// request line: `"GET / HTTP/1.1" 404 153 ...`.
fn nginx_access_level(line: &str) -> Level {
    static STATUS: OnceLock<Regex> = OnceLock::new();
    let re = STATUS.get_or_init(|| {
        Regex::new(r#"" ([1-5])\d{2} "#).expect("nginx_access_level: invalid regex")
    });

    match re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str()) {
        Some("4") | Some("5") => Level::Error,
        Some("3") => Level::Warning,
        _ => Level::Info,
    }
}

/// Cap a message at `MAX_MESSAGE_CHARS` characters, appending an ellipsis
/// when anything was cut. Counts chars, not bytes, so multi-byte text is
/// never split mid-character.
pub fn truncate_message(line: &str) -> String {
    match line.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((idx, _)) => {
            let mut out = String::with_capacity(idx + TRUNCATION_SUFFIX.len());
            out.push_str(&line[..idx]);
            out.push_str(TRUNCATION_SUFFIX);
            out
        }
        None => line.to_string(),
    }
}
