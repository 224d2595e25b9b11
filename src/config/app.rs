//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::analytics::{
    AnalyticsBuilder, DEFAULT_EXTERNAL_MARKER, DEFAULT_FLUSH_INTERVAL, DEFAULT_RETENTION,
    REPORT_DAYS,
};
use crate::storage::db::DEFAULT_MAX_CONNECTIONS;

use super::validation::{ConfigError, expand_env_vars};

// =============================================================================
// Constants
// =============================================================================

/// Default database file path.
pub const DEFAULT_DB_PATH: &str = "analytics.db";

/// Shortest accepted retention window: the report never looks further back.
pub const MIN_RETENTION: Duration =
    Duration::from_secs(REPORT_DAYS as u64 * 24 * 60 * 60);

fn default_flush_interval() -> Duration {
    DEFAULT_FLUSH_INTERVAL
}

fn default_retention() -> Duration {
    DEFAULT_RETENTION
}

fn default_external_marker() -> String {
    DEFAULT_EXTERNAL_MARKER.to_string()
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8080).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path. Supports `${VAR}` and `${VAR:-default}`.
    pub path: String,

    /// Maximum pooled connections (default: 4).
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl DatabaseConfig {
    /// SQLite connection URL for the configured path.
    pub fn connection_url(&self) -> String {
        format!("sqlite:{}", expand_env_vars(&self.path))
    }
}

// =============================================================================
// Analytics Configuration
// =============================================================================

/// Pipeline timing and queue settings.
///
/// Retention passes run every half retention, so there is no separate
/// prune interval setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalyticsConfig {
    /// Interval between batch flushes (default: 30s).
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,

    /// Maximum age of persisted records (default: 14d).
    #[serde(default = "default_retention", with = "humantime_serde")]
    pub retention: Duration,

    /// Ingestion queue capacity (default: 64Ki per CPU).
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Path segment marking externally-facing routes (default: "/external/").
    #[serde(default = "default_external_marker")]
    pub external_marker: String,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            retention: DEFAULT_RETENTION,
            queue_capacity: None,
            external_marker: DEFAULT_EXTERNAL_MARKER.to_string(),
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Pipeline configuration.
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database path must not be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database max_connections must be positive".to_string(),
            ));
        }

        let analytics = &self.analytics;
        if analytics.flush_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "analytics flush_interval must be positive".to_string(),
            ));
        }

        if analytics.retention < MIN_RETENTION {
            return Err(ConfigError::ValidationError(format!(
                "analytics retention must cover the {}-day report window",
                REPORT_DAYS
            )));
        }

        if analytics.queue_capacity == Some(0) {
            return Err(ConfigError::ValidationError(
                "analytics queue_capacity must be positive".to_string(),
            ));
        }

        if analytics.external_marker.is_empty() {
            return Err(ConfigError::ValidationError(
                "analytics external_marker must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Analytics builder configured from this file.
    pub fn analytics_builder(&self) -> AnalyticsBuilder {
        let analytics = &self.analytics;
        let builder = AnalyticsBuilder::new(self.database.connection_url())
            .max_connections(self.database.max_connections)
            .flush_interval(analytics.flush_interval)
            .retention(analytics.retention)
            .external_marker(analytics.external_marker.clone());

        match analytics.queue_capacity {
            Some(capacity) => builder.queue_capacity(capacity),
            None => builder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_analytics_config_default() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.retention, Duration::from_secs(14 * 86400));
        assert_eq!(config.queue_capacity, None);
        assert_eq!(config.external_marker, "/external/");
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("{}").unwrap();
        assert_eq!(config.database.path, DEFAULT_DB_PATH);
        assert_eq!(config.database.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.analytics.flush_interval, DEFAULT_FLUSH_INTERVAL);
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
server:
  bind: "127.0.0.1"
  port: 9090
database:
  path: "data/requests.db"
analytics:
  flush_interval: 5s
  retention: 30d
  queue_capacity: 2048
  external_marker: "/public/"
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.database.connection_url(), "sqlite:data/requests.db");
        assert_eq!(config.analytics.flush_interval, Duration::from_secs(5));
        assert_eq!(config.analytics.retention, Duration::from_secs(30 * 86400));
        assert_eq!(config.analytics.queue_capacity, Some(2048));
        assert_eq!(config.analytics.external_marker, "/public/");
    }

    #[test]
    fn test_connection_url_expands_env_vars() {
        let config = DatabaseConfig {
            path: "${ABACUS_TEST_UNSET_DIR_12345:-/var/lib/abacus}/analytics.db".to_string(),
            max_connections: 1,
        };
        assert_eq!(
            config.connection_url(),
            "sqlite:/var/lib/abacus/analytics.db"
        );
    }

    #[test]
    fn test_config_validation_invalid_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_invalid_bind_address() {
        let mut config = AppConfig::default();
        config.server.bind = "not-an-ip".to_string();

        let result = config.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("invalid server bind address")
        );
    }

    #[test]
    fn test_config_validation_rejects_short_retention() {
        for retention in ["1h", "2d", "13d"] {
            let yaml = format!("analytics:\n  retention: {retention}\n");
            let err = AppConfig::from_yaml(&yaml).unwrap_err();
            assert!(err.to_string().contains("retention"), "{retention}: {err}");
        }

        let config = AppConfig::from_yaml("analytics:\n  retention: 14d\n").unwrap();
        assert_eq!(config.analytics.retention, MIN_RETENTION);
    }

    #[test]
    fn test_prune_interval_is_not_configurable() {
        let result = AppConfig::from_yaml("analytics:\n  prune_interval: 1h\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_validation_rejects_zero_queue() {
        let mut config = AppConfig::default();
        config.analytics.queue_capacity = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_duration_is_parse_error() {
        let result = AppConfig::from_yaml("analytics:\n  flush_interval: soon\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }
}
