//! Database backend for the embedded analytics store.
//!
//! `SqlitePool` wraps a sqlx pool configured for a single local database file.

mod sqlite;

pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePool};
