//! Retention pruning of persisted request records.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::analytics::AnalyticsError;
use crate::storage::{PruneStats, RequestStore};

/// Delete every record older than `threshold` before now.
pub async fn prune(store: &RequestStore, threshold: Duration) -> Result<PruneStats, AnalyticsError> {
    prune_at(store, threshold, Utc::now()).await
}

/// Delete every record whose timestamp is strictly before `now - threshold`.
pub async fn prune_at(
    store: &RequestStore,
    threshold: Duration,
    now: DateTime<Utc>,
) -> Result<PruneStats, AnalyticsError> {
    let cutoff = cutoff_millis(threshold, now);
    let stats = store.delete_before(cutoff).await?;

    tracing::info!(
        deleted = stats.deleted,
        scanned = stats.scanned,
        undecodable = stats.undecodable,
        retention = %humantime::format_duration(threshold),
        "Request records pruned"
    );
    Ok(stats)
}

/// Retention cutoff in Unix milliseconds.
pub fn cutoff_millis(threshold: Duration, now: DateTime<Utc>) -> i64 {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    now.timestamp_millis().saturating_sub(threshold_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RequestRecord;
    use chrono::TimeZone;
    use tempfile::{TempDir, tempdir};

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);
    const RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap()
    }

    fn record(caller: &str, timestamp: i64) -> RequestRecord {
        RequestRecord {
            url: "/api/contents".to_string(),
            method: "GET".to_string(),
            origin: String::new(),
            protocol: "HTTP/1.1".to_string(),
            caller_id: caller.to_string(),
            timestamp,
            external: false,
        }
    }

    async fn seeded_store() -> (RequestStore, TempDir, i64) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("prune.db").display());
        let store = RequestStore::open(&url, 2).await.unwrap();
        let cutoff = cutoff_millis(RETENTION, now());

        store
            .insert_batch(&[
                record("ancient", cutoff - 30 * DAY.as_millis() as i64),
                record("just-expired", cutoff - 1),
                record("at-cutoff", cutoff),
                record("recent", now().timestamp_millis() - 1000),
            ])
            .await
            .unwrap();

        (store, dir, cutoff)
    }

    async fn remaining_callers(store: &RequestStore) -> Vec<String> {
        let mut callers: Vec<String> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.caller_id)
            .collect();
        callers.sort();
        callers
    }

    #[test]
    fn test_cutoff_millis() {
        let cutoff = cutoff_millis(RETENTION, now());
        assert_eq!(
            cutoff,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0)
                .unwrap()
                .timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_prune_removes_only_strictly_older_records() {
        let (store, _dir, _cutoff) = seeded_store().await;

        let stats = prune_at(&store, RETENTION, now()).await.unwrap();
        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.scanned, 4);
        assert_eq!(remaining_callers(&store).await, vec!["at-cutoff", "recent"]);
    }

    #[tokio::test]
    async fn test_prune_is_idempotent() {
        let (store, _dir, _cutoff) = seeded_store().await;

        prune_at(&store, RETENTION, now()).await.unwrap();
        let after_first = remaining_callers(&store).await;

        let stats = prune_at(&store, RETENTION, now()).await.unwrap();
        assert_eq!(stats.deleted, 0);
        assert_eq!(remaining_callers(&store).await, after_first);
    }

    #[tokio::test]
    async fn test_prune_later_cutoff_only_removes_expired() {
        let (store, _dir, _cutoff) = seeded_store().await;

        prune_at(&store, RETENTION, now()).await.unwrap();
        let later = now() + chrono::Duration::milliseconds(1);
        let stats = prune_at(&store, RETENTION, later).await.unwrap();

        assert_eq!(stats.deleted, 1);
        assert_eq!(remaining_callers(&store).await, vec!["recent"]);
    }
}
