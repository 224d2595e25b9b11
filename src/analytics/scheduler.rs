//! Background scheduler owning the ingestion queue.
//!
//! Single-consumer pattern: one task owns the queue receiver and wakes on
//! whichever fires first of the flush timer, the prune timer, or a control
//! command. Failures are logged and the loop keeps running.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::analytics::{AnalyticsError, flush, prune};
use crate::storage::{PruneStats, RequestRecord, RequestStore};

// =============================================================================
// Constants
// =============================================================================

/// Interval between batch flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum age of a persisted record.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Interval between retention passes (half the retention).
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(DEFAULT_RETENTION.as_secs() / 2);

/// Capacity of the control channel.
const COMMAND_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Commands
// =============================================================================

/// Commands sent to the scheduler.
#[derive(Debug)]
pub enum Command {
    /// Flush the queue now and report how many records were written.
    Flush(oneshot::Sender<Result<usize, AnalyticsError>>),
    /// Run a retention pass now.
    Prune(oneshot::Sender<Result<PruneStats, AnalyticsError>>),
    /// Flush what is queued and stop.
    Shutdown,
}

/// Timer settings of the scheduler.
///
/// Outside the crate the prune interval only changes through
/// [`Schedule::with_retention`], which keeps it at half the retention.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub flush_interval: Duration,
    pub(crate) prune_interval: Duration,
    pub(crate) retention: Duration,
}

impl Schedule {
    /// Set the retention and derive the prune interval from it.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self.prune_interval = retention / 2;
        self
    }

    /// Maximum age of a persisted record.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Interval between retention passes.
    pub fn prune_interval(&self) -> Duration {
        self.prune_interval
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            retention: DEFAULT_RETENTION,
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Background task driving flushes and retention passes.
pub struct Scheduler {
    queue: mpsc::Receiver<RequestRecord>,
    commands: mpsc::Receiver<Command>,
    store: RequestStore,
    schedule: Schedule,
    max_batch: usize,
}

impl Scheduler {
    /// Spawn the scheduler onto the tokio runtime.
    ///
    /// Returns the task handle and the command sender.
    pub fn spawn(
        queue: mpsc::Receiver<RequestRecord>,
        store: RequestStore,
        schedule: Schedule,
        max_batch: usize,
    ) -> (JoinHandle<()>, mpsc::Sender<Command>) {
        let (tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let scheduler = Scheduler {
            queue,
            commands,
            store,
            schedule,
            max_batch,
        };
        let handle = tokio::spawn(scheduler.run());

        (handle, tx)
    }

    async fn run(mut self) {
        tracing::info!(
            flush_interval = %humantime::format_duration(self.schedule.flush_interval),
            prune_interval = %humantime::format_duration(self.schedule.prune_interval),
            retention = %humantime::format_duration(self.schedule.retention),
            "Analytics scheduler started"
        );

        let mut flush_timer = ticker(self.schedule.flush_interval);
        let mut prune_timer = ticker(self.schedule.prune_interval);

        loop {
            tokio::select! {
                _ = flush_timer.tick() => {
                    if let Err(e) = self.flush().await {
                        tracing::error!(error = %e, "Periodic flush failed");
                    }
                }
                _ = prune_timer.tick() => {
                    if let Err(e) = self.prune().await {
                        tracing::error!(error = %e, "Periodic prune failed");
                    }
                }
                cmd = self.commands.recv() => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("Analytics scheduler stopped");
    }

    /// Returns true when the loop should stop.
    async fn handle_command(&mut self, cmd: Option<Command>) -> bool {
        match cmd {
            Some(Command::Flush(reply)) => {
                let _ = reply.send(self.flush().await);
            }
            Some(Command::Prune(reply)) => {
                let _ = reply.send(self.prune().await);
            }
            Some(Command::Shutdown) => {
                tracing::info!("Analytics scheduler shutting down");
                if let Err(e) = self.flush().await {
                    tracing::error!(error = %e, "Final flush failed");
                }
                return true;
            }
            None => {
                tracing::warn!("Command channel disconnected, shutting down");
                if let Err(e) = self.flush().await {
                    tracing::error!(error = %e, "Final flush failed");
                }
                return true;
            }
        }
        false
    }

    async fn flush(&mut self) -> Result<usize, AnalyticsError> {
        flush::flush(&mut self.queue, &self.store, self.max_batch).await
    }

    async fn prune(&self) -> Result<PruneStats, AnalyticsError> {
        prune::prune(&self.store, self.schedule.retention).await
    }
}

/// Interval timer whose first tick fires one period from now.
fn ticker(period: Duration) -> Interval {
    let mut timer = time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    async fn open_store() -> (RequestStore, TempDir) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("scheduler.db").display());
        (RequestStore::open(&url, 2).await.unwrap(), dir)
    }

    fn record(ts: i64) -> RequestRecord {
        RequestRecord {
            url: "/api/contents".to_string(),
            method: "GET".to_string(),
            origin: String::new(),
            protocol: "HTTP/1.1".to_string(),
            caller_id: "127.0.0.1:9000".to_string(),
            timestamp: ts,
            external: false,
        }
    }

    fn idle_schedule() -> Schedule {
        Schedule {
            flush_interval: Duration::from_secs(3600),
            prune_interval: Duration::from_secs(3600),
            retention: DEFAULT_RETENTION,
        }
    }

    #[test]
    fn test_default_schedule() {
        let schedule = Schedule::default();
        assert_eq!(schedule.flush_interval, Duration::from_secs(30));
        assert_eq!(schedule.prune_interval(), Duration::from_secs(7 * 86400));
        assert_eq!(schedule.prune_interval(), schedule.retention() / 2);
    }

    #[test]
    fn test_retention_drives_prune_interval() {
        let schedule = Schedule::default().with_retention(Duration::from_secs(30 * 86400));
        assert_eq!(schedule.retention(), Duration::from_secs(30 * 86400));
        assert_eq!(schedule.prune_interval(), Duration::from_secs(15 * 86400));
    }

    #[tokio::test]
    async fn test_scheduler_lifecycle() {
        let (store, _dir) = open_store().await;
        let (_queue_tx, queue_rx) = mpsc::channel(8);

        let (handle, tx) = Scheduler::spawn(queue_rx, store, idle_schedule(), 8);
        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_flush_command() {
        let (store, _dir) = open_store().await;
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (handle, tx) = Scheduler::spawn(queue_rx, store.clone(), idle_schedule(), 8);

        let now = chrono::Utc::now().timestamp_millis();
        queue_tx.send(record(now)).await.unwrap();
        queue_tx.send(record(now)).await.unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Flush(reply_tx)).await.unwrap();
        assert_eq!(reply_rx.await.unwrap().unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_prune_command() {
        let (store, _dir) = open_store().await;
        store.insert_batch(&[record(0)]).await.unwrap();
        let (_queue_tx, queue_rx) = mpsc::channel(8);
        let (handle, tx) = Scheduler::spawn(queue_rx, store.clone(), idle_schedule(), 8);

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Prune(reply_tx)).await.unwrap();
        let stats = reply_rx.await.unwrap().unwrap();
        assert_eq!(stats.deleted, 1);
        assert_eq!(store.count().await.unwrap(), 0);

        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queue() {
        let (store, _dir) = open_store().await;
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (handle, tx) = Scheduler::spawn(queue_rx, store.clone(), idle_schedule(), 8);

        queue_tx.send(record(1)).await.unwrap();
        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_time_based_flush() {
        let (store, _dir) = open_store().await;
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let schedule = Schedule {
            flush_interval: Duration::from_millis(100),
            ..idle_schedule()
        };
        let (handle, tx) = Scheduler::spawn(queue_rx, store.clone(), schedule, 8);

        queue_tx.send(record(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.count().await.unwrap(), 1, "timer should have flushed");

        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_time_based_prune() {
        let (store, _dir) = open_store().await;
        store.insert_batch(&[record(0)]).await.unwrap();
        let (_queue_tx, queue_rx) = mpsc::channel(8);
        let schedule = Schedule {
            prune_interval: Duration::from_millis(100),
            ..idle_schedule()
        };
        let (handle, tx) = Scheduler::spawn(queue_rx, store.clone(), schedule, 8);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(store.count().await.unwrap(), 0, "timer should have pruned");

        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_periodic_flush_keeps_running() {
        let (store, _dir) = open_store().await;
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let schedule = Schedule {
            flush_interval: Duration::from_millis(100),
            ..idle_schedule()
        };
        let (handle, tx) = Scheduler::spawn(queue_rx, store.clone(), schedule, 8);

        store.close().await;
        queue_tx.send(record(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // The failed batch was dropped; the loop still answers commands.
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Command::Flush(reply_tx)).await.unwrap();
        assert_eq!(reply_rx.await.unwrap().unwrap(), 0);

        tx.send(Command::Shutdown).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_command_sender_stops_scheduler() {
        let (store, _dir) = open_store().await;
        let (_queue_tx, queue_rx) = mpsc::channel(8);
        let (handle, tx) = Scheduler::spawn(queue_rx, store, idle_schedule(), 8);

        drop(tx);
        handle.await.unwrap();
    }
}
