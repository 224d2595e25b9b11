//! Database schema definitions.

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;

/// Name of the collection holding persisted request records.
pub const REQUESTS_TABLE: &str = "requests";

/// SQL statement for creating the `requests` collection.
///
/// The table is used as a key-value collection: `id` is a store-generated
/// opaque key, `value` the JSON-encoded [`RequestRecord`](crate::RequestRecord).
/// Key order carries no meaning for readers.
pub const REQUESTS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    value BLOB NOT NULL
);
"#;

/// Initialize the database schema.
///
/// Idempotent: creates the `requests` collection if it does not exist.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(REQUESTS_TABLE_DDL).execute(pool.inner()).await?;

    tracing::info!(collection = REQUESTS_TABLE, "Database schema initialized");
    Ok(())
}
