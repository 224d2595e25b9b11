//! The `requests` collection.
//!
//! [`RequestStore`] is the only gateway to persisted request records. Every
//! operation runs inside a single transaction so that batch writes are
//! all-or-nothing and scans see a consistent snapshot.

use std::path::Path;

use crate::storage::StorageError;
use crate::storage::db::SqlitePool;
use crate::storage::schema::init_schema;
use crate::storage::types::RequestRecord;

/// Outcome of a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Records examined.
    pub scanned: usize,
    /// Records deleted for being older than the cutoff.
    pub deleted: usize,
    /// Records skipped because their value could not be decoded.
    pub undecodable: usize,
}

/// Transactional access to the `requests` collection.
#[derive(Clone)]
pub struct RequestStore {
    pool: SqlitePool,
}

impl std::fmt::Debug for RequestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestStore").finish_non_exhaustive()
    }
}

impl RequestStore {
    /// Open (or create) the database at `url` and ensure the collection exists.
    pub async fn open(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        create_parent_dir(url)?;

        let pool = SqlitePool::connect(url, max_connections).await?;
        init_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Persist a batch of records in one transaction.
    ///
    /// Returns the number of records written. An empty batch is a no-op.
    pub async fn insert_batch(&self, records: &[RequestRecord]) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        // Encode up front so a bad record aborts before the transaction opens.
        let values = records
            .iter()
            .map(serde_json::to_vec)
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.pool.inner().begin().await?;
        for value in &values {
            sqlx::query("INSERT INTO requests (value) VALUES (?)")
                .bind(value.as_slice())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(count = values.len(), "Request batch inserted");
        Ok(values.len())
    }

    /// Read every decodable record.
    ///
    /// Undecodable values are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<RequestRecord>, StorageError> {
        let mut tx = self.pool.inner().begin().await?;
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as("SELECT id, value FROM requests")
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let records = rows
            .into_iter()
            .filter_map(|(id, value)| match serde_json::from_slice(&value) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(id, error = %e, "Skipping undecodable request record");
                    None
                }
            })
            .collect();

        Ok(records)
    }

    /// Delete every record whose timestamp is strictly before `cutoff_ms`.
    ///
    /// Scan and deletes share one transaction. Undecodable values are kept.
    pub async fn delete_before(&self, cutoff_ms: i64) -> Result<PruneStats, StorageError> {
        let mut tx = self.pool.inner().begin().await?;
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as("SELECT id, value FROM requests")
            .fetch_all(&mut *tx)
            .await?;

        let mut stats = PruneStats {
            scanned: rows.len(),
            ..PruneStats::default()
        };

        for (id, value) in rows {
            let record: RequestRecord = match serde_json::from_slice(&value) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(id, error = %e, "Skipping undecodable request record");
                    stats.undecodable += 1;
                    continue;
                }
            };

            if record.timestamp < cutoff_ms {
                sqlx::query("DELETE FROM requests WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                stats.deleted += 1;
            }
        }
        tx.commit().await?;

        Ok(stats)
    }

    /// Number of stored entries, decodable or not.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM requests")
            .fetch_one(self.pool.inner())
            .await?;
        Ok(u64::try_from(row.0).unwrap_or_default())
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Create the parent directory of a file-backed SQLite URL if it is missing.
fn create_parent_dir(url: &str) -> Result<(), StorageError> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return Ok(());
    }

    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StorageError::Internal(format!(
                "Failed to create database directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    Ok(())
}
