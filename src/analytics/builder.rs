//! Analytics builder and service handle.
//!
//! Provides a builder pattern for starting the pipeline (store, queue,
//! scheduler) and the [`Analytics`] handle used to record requests, query
//! reports and shut everything down.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::analytics::recorder::DEFAULT_EXTERNAL_MARKER;
use crate::analytics::report::{self, ChartData};
use crate::analytics::scheduler::{Command, Schedule, Scheduler};
use crate::analytics::{AnalyticsError, Recorder, RequestInfo};
use crate::storage::db::DEFAULT_MAX_CONNECTIONS;
use crate::storage::{PruneStats, RequestStore};

/// Queue slots per available CPU.
const QUEUE_SLOTS_PER_CPU: usize = 64 * 1024;

/// Calculate default queue capacity based on available CPU parallelism.
fn default_queue_capacity() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);
    QUEUE_SLOTS_PER_CPU.saturating_mul(cpus)
}

/// Builder for starting the analytics pipeline.
pub struct AnalyticsBuilder {
    db_url: String,
    max_connections: u32,
    queue_capacity: usize,
    schedule: Schedule,
    external_marker: String,
}

impl AnalyticsBuilder {
    /// Create a new builder for the database at `db_url`.
    ///
    /// Queue capacity defaults to 64Ki slots per available CPU.
    pub fn new(db_url: impl Into<String>) -> Self {
        Self {
            db_url: db_url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            queue_capacity: default_queue_capacity(),
            schedule: Schedule::default(),
            external_marker: DEFAULT_EXTERNAL_MARKER.to_string(),
        }
    }

    /// Set the maximum number of pooled database connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the ingestion queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the interval between batch flushes. Default: 30 seconds.
    pub fn flush_interval(mut self, interval: Duration) -> Self {
        self.schedule.flush_interval = interval;
        self
    }

    /// Set the maximum age of persisted records. Default: 14 days.
    ///
    /// Retention passes run every half retention.
    pub fn retention(mut self, retention: Duration) -> Self {
        self.schedule = self.schedule.with_retention(retention);
        self
    }

    /// Set the path marker identifying externally-facing routes.
    pub fn external_marker(mut self, marker: impl Into<String>) -> Self {
        self.external_marker = marker.into();
        self
    }

    /// Open the store, allocate the queue and start the scheduler.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn build(self) -> Result<Analytics, AnalyticsError> {
        let store = RequestStore::open(&self.db_url, self.max_connections).await?;

        let (queue_tx, queue_rx) = mpsc::channel(self.queue_capacity);
        let (handle, commands) =
            Scheduler::spawn(queue_rx, store.clone(), self.schedule, self.queue_capacity);

        tracing::info!(
            db_url = %self.db_url,
            queue_capacity = self.queue_capacity,
            "Analytics pipeline started"
        );

        Ok(Analytics {
            recorder: Recorder::new(queue_tx, &self.external_marker),
            store,
            commands,
            scheduler: Some(handle),
        })
    }
}

/// Handle to the running analytics pipeline.
pub struct Analytics {
    recorder: Recorder,
    store: RequestStore,
    commands: mpsc::Sender<Command>,
    scheduler: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

impl Analytics {
    /// Cloneable recorder for request-handling paths.
    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }

    /// Cloneable store handle for report queries.
    pub fn store(&self) -> RequestStore {
        self.store.clone()
    }

    /// Record one request. See [`Recorder::record`].
    pub async fn record(&self, info: RequestInfo) {
        self.recorder.record(info).await;
    }

    /// Daily usage of the trailing 14 days.
    pub async fn report(&self) -> Result<ChartData, AnalyticsError> {
        report::report(&self.store).await
    }

    /// Flush the queue now instead of waiting for the next tick.
    pub async fn flush(&self) -> Result<usize, AnalyticsError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Flush(reply)).await?;
        rx.await.map_err(|_| AnalyticsError::SchedulerStopped)?
    }

    /// Run a retention pass now instead of waiting for the next tick.
    pub async fn prune(&self) -> Result<PruneStats, AnalyticsError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Prune(reply)).await?;
        rx.await.map_err(|_| AnalyticsError::SchedulerStopped)?
    }

    async fn send(&self, cmd: Command) -> Result<(), AnalyticsError> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| AnalyticsError::SchedulerStopped)
    }

    /// Stop the scheduler and close the store.
    ///
    /// Whatever is queued at this point gets one final flush. Errors are
    /// logged, never returned.
    pub async fn close(mut self) {
        if let Err(e) = self.send(Command::Shutdown).await {
            tracing::warn!(error = %e, "Failed to signal analytics scheduler");
        }

        if let Some(handle) = self.scheduler.take()
            && let Err(e) = handle.await
        {
            tracing::error!(error = %e, "Analytics scheduler task failed");
        }

        self.store.close().await;
        tracing::info!("Analytics pipeline closed");
    }
}

impl Drop for Analytics {
    fn drop(&mut self) {
        // Best effort stop if close() was never awaited
        if self.scheduler.is_some() {
            let _ = self.commands.try_send(Command::Shutdown);
        }
    }
}
