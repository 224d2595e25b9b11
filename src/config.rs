//! Configuration module for Abacus.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Database settings (path, pool size)
//! - Pipeline settings (flush interval, retention, queue capacity)

mod app;
mod validation;

pub use app::{AnalyticsConfig, AppConfig, DatabaseConfig, ServerConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::{DEFAULT_DB_PATH, MIN_RETENTION};
pub use crate::storage::db::DEFAULT_MAX_CONNECTIONS;
