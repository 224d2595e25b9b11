//! Batch writer: drains the ingestion queue into the store.

use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::analytics::AnalyticsError;
use crate::storage::{RequestRecord, RequestStore};

/// Take every record currently queued, up to `max_batch`, without waiting.
///
/// Queue order is preserved.
pub fn drain(rx: &mut mpsc::Receiver<RequestRecord>, max_batch: usize) -> Vec<RequestRecord> {
    let mut batch = Vec::new();
    while batch.len() < max_batch {
        match rx.try_recv() {
            Ok(record) => batch.push(record),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    batch
}

/// Drain the queue and persist the batch in one transaction.
///
/// Returns the number of records written. If the transaction fails the
/// drained records are not persisted and are not requeued.
pub async fn flush(
    rx: &mut mpsc::Receiver<RequestRecord>,
    store: &RequestStore,
    max_batch: usize,
) -> Result<usize, AnalyticsError> {
    let batch = drain(rx, max_batch);
    if batch.is_empty() {
        return Ok(0);
    }

    match store.insert_batch(&batch).await {
        Ok(written) => {
            tracing::debug!(count = written, "Request batch flushed");
            Ok(written)
        }
        Err(e) => {
            tracing::error!(error = %e, count = batch.len(), "Request batch dropped");
            Err(e.into())
        }
    }
}
