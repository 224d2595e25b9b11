//! Configuration validation utilities.

use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse a human-readable duration such as `30s`, `12h` or `7d`.
///
/// Used as the clap value parser for interval overrides.
///
/// # Examples
///
/// ```
/// use abacus::config::parse_duration;
///
/// assert_eq!(parse_duration("30s").unwrap().as_secs(), 30);
/// assert_eq!(parse_duration("1m").unwrap().as_secs(), 60);
/// assert_eq!(parse_duration("2h").unwrap().as_secs(), 7200);
/// assert_eq!(parse_duration("7d").unwrap().as_secs(), 7 * 86400);
/// ```
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("duration string is empty".to_string());
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Matches `${VAR}` and `${VAR:-default}` references.
static ENV_VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var pattern is a valid regex")
});

/// Expand environment variable references in a configured path.
///
/// Unset variables without a default expand to the empty string.
pub fn expand_env_vars(input: &str) -> String {
    ENV_VAR_REGEX
        .replace_all(input, |caps: &Captures| {
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| fallback.to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_valid() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("30x").is_err());
        assert!(parse_duration("30").is_err());
    }

    #[test]
    fn test_parse_duration_extended_formats() {
        assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86400));
        assert_eq!(parse_duration("2h 30m").unwrap(), Duration::from_secs(9000));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        assert_eq!(expand_env_vars("hello world"), "hello world");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        // Use a variable that definitely doesn't exist
        let result = expand_env_vars("${NONEXISTENT_DATA_DIR_12345:-./data}/analytics.db");
        assert_eq!(result, "./data/analytics.db");
    }

    #[test]
    fn test_expand_env_vars_from_env() {
        // SAFETY: This test runs in isolation and only modifies a test-specific variable.
        unsafe {
            std::env::set_var("ABACUS_TEST_DATA_DIR", "/srv/abacus");
        }
        let result = expand_env_vars("${ABACUS_TEST_DATA_DIR}/analytics.db");
        assert_eq!(result, "/srv/abacus/analytics.db");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("ABACUS_TEST_DATA_DIR");
        }
    }

    #[test]
    fn test_expand_env_vars_missing_without_default() {
        let result = expand_env_vars("${ABACUS_NONEXISTENT_DIR_12345}/analytics.db");
        assert_eq!(result, "/analytics.db");
    }
}
