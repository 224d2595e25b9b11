//! Request recording onto the bounded ingestion queue.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::storage::RequestRecord;

/// Default path marker for externally-facing routes.
pub const DEFAULT_EXTERNAL_MARKER: &str = "/external/";

/// Description of an inbound request, supplied by the HTTP layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RequestInfo {
    /// Full request target, including the query string.
    pub url: String,
    /// Request path, used for external-route detection.
    pub path: String,
    /// HTTP verb.
    pub method: String,
    /// `Origin` header value.
    pub origin: Option<String>,
    /// Wire protocol label, e.g. `HTTP/1.1`.
    pub protocol: String,
    /// Peer address of the caller.
    pub remote_addr: String,
}

/// Whether `path` belongs to an externally-facing route.
pub fn is_external(path: &str, marker: &str) -> bool {
    !marker.is_empty() && path.contains(marker)
}

impl RequestRecord {
    /// Derive a record from a request description.
    pub fn from_info(info: RequestInfo, external_marker: &str, timestamp: i64) -> Self {
        let external = is_external(&info.path, external_marker);
        Self {
            url: info.url,
            method: info.method,
            origin: info.origin.unwrap_or_default(),
            protocol: info.protocol,
            caller_id: info.remote_addr,
            timestamp,
            external,
        }
    }
}

/// Cloneable handle that enqueues request records.
///
/// Recording never touches the store. When the queue is full the caller
/// waits until the next flush frees capacity, so no event is dropped while
/// the pipeline is running.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::Sender<RequestRecord>,
    external_marker: Arc<str>,
}

impl std::fmt::Debug for Recorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder")
            .field("external_marker", &self.external_marker)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    pub(crate) fn new(tx: mpsc::Sender<RequestRecord>, external_marker: &str) -> Self {
        Self {
            tx,
            external_marker: Arc::from(external_marker),
        }
    }

    /// Record one request.
    pub async fn record(&self, info: RequestInfo) {
        let record = RequestRecord::from_info(
            info,
            &self.external_marker,
            Utc::now().timestamp_millis(),
        );

        if self.tx.send(record).await.is_err() {
            tracing::debug!("Analytics pipeline closed, discarding request record");
        }
    }

    /// Number of records currently waiting for a flush.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
