#![allow(clippy::module_name_repetitions)]
//! Small utilities: shell quoting for previews, env toggles, timestamps, filesystem helpers.

pub mod fs;
pub mod id;

use std::env;

/// Truthy env toggle: `1`, `true`, `yes`, `on` (any case).
pub fn env_is_truthy(key: &str) -> bool {
    env::var(key)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

pub fn is_truthy(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| shell_escape(a))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_=./:@".contains(c))
    {
        s.to_string()
    } else {
        let escaped = s.replace('\'', "'\"'\"'");
        format!("'{}'", escaped)
    }
}
