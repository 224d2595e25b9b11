//! sqlx pool over the local analytics file.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool as SqlxPool, SqlitePoolOptions,
    SqliteSynchronous,
};

use crate::storage::StorageError;

/// Default upper bound of pooled connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// How long a caller waits for a free connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pooled connections to one SQLite file, opened in WAL mode.
///
/// WAL lets report scans read a committed snapshot while a flush or prune
/// transaction is writing.
#[derive(Clone)]
pub struct SqlitePool {
    inner: SqlxPool,
}

impl std::fmt::Debug for SqlitePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePool").finish_non_exhaustive()
    }
}

/// Connection options for `url`; the file is created when missing.
fn connect_options(url: &str) -> Result<SqliteConnectOptions, StorageError> {
    Ok(SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal))
}

impl SqlitePool {
    /// Open the database at `url` (e.g. `sqlite:data/analytics.db`).
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let inner = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(connect_options(url)?)
            .await?;

        Ok(Self { inner })
    }

    #[inline]
    pub fn inner(&self) -> &SqlxPool {
        &self.inner
    }

    /// Wait for checked-out connections to return, then close them all.
    pub async fn close(&self) {
        self.inner.close().await;
    }
}
