use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the analytics pipeline.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Underlying store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Failed to encode a report series.
    #[error("failed to encode report: {0}")]
    Encode(#[from] serde_json::Error),

    /// The background scheduler is no longer running.
    #[error("analytics scheduler is not running")]
    SchedulerStopped,
}
