//! Secret redaction for log lines
//!
//! Environment variable values whose key looks sensitive are masked before
//! being interpolated into a log line. This is a narrow, log-only concern —
//! not a general-purpose secret scanner.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTION_PLACEHOLDER: &str = "****";

static SENSITIVE_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(token|secret|password|passwd|api[_-]?key|credential|auth)").unwrap()
});

/// Returns true if an environment variable with this key should have its
/// value redacted before logging.
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY_PATTERN.is_match(key)
}

/// Redact `value` if `key` looks sensitive; otherwise return it unchanged.
pub fn redact_if_enabled(key: &str, value: &str) -> String {
    if is_sensitive_key(key) {
        REDACTION_PLACEHOLDER.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_keys_detected_case_insensitively() {
        assert!(is_sensitive_key("API_TOKEN"));
        assert!(is_sensitive_key("db_password"));
        assert!(is_sensitive_key("Secret"));
        assert!(is_sensitive_key("AUTH_HEADER"));
        assert!(!is_sensitive_key("WORKSPACE_HOME"));
    }

    #[test]
    fn test_redact_if_enabled() {
        assert_eq!(redact_if_enabled("GITHUB_TOKEN", "abc123"), "****");
        assert_eq!(redact_if_enabled("FOO", "bar"), "bar");
    }
}
