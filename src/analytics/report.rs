//! Trailing daily usage report.
//!
//! Records are bucketed into the last [`REPORT_DAYS`] UTC calendar days,
//! today included. Day `j` covers `[B[j], B[j + 1])` where `B` are the
//! midnight boundaries ordered oldest first; the most recent day is open
//! ended so that records stamped slightly in the future still count
//! towards today. Records before the earliest boundary are ignored.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;

use crate::analytics::AnalyticsError;
use crate::storage::{RequestRecord, RequestStore};

/// Number of days covered by a report.
pub const REPORT_DAYS: usize = 14;

/// Label format of each day (`MM/DD`).
const DATE_LABEL_FORMAT: &str = "%m/%d";

/// Midnight (UTC) of the day containing `now`.
pub fn utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Day boundaries of the report window, oldest first.
///
/// The last entry is today's midnight.
pub fn day_boundaries(now: DateTime<Utc>) -> [DateTime<Utc>; REPORT_DAYS] {
    let today = utc_midnight(now);
    std::array::from_fn(|i| today - Duration::days((REPORT_DAYS - 1 - i) as i64))
}

/// Index of the day bucket `timestamp_ms` belongs to, if inside the window.
pub fn bucket_index(boundaries_ms: &[i64; REPORT_DAYS], timestamp_ms: i64) -> Option<usize> {
    boundaries_ms
        .partition_point(|&boundary| boundary <= timestamp_ms)
        .checked_sub(1)
}

/// Per-day request counts for the report window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyUsage {
    /// Midnight of each day, oldest first.
    pub days: [DateTime<Utc>; REPORT_DAYS],
    /// Distinct callers seen each day.
    pub unique: [u64; REPORT_DAYS],
    /// Requests seen each day.
    pub total: [u64; REPORT_DAYS],
}

impl DailyUsage {
    /// Bucket `records` into the days ending at `now`.
    pub fn compute<'a>(
        records: impl IntoIterator<Item = &'a RequestRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let days = day_boundaries(now);
        let boundaries_ms = days.map(|day| day.timestamp_millis());

        let mut seen: [HashSet<&str>; REPORT_DAYS] = std::array::from_fn(|_| HashSet::new());
        let mut unique = [0u64; REPORT_DAYS];
        let mut total = [0u64; REPORT_DAYS];

        for record in records {
            let Some(idx) = bucket_index(&boundaries_ms, record.timestamp) else {
                continue;
            };

            total[idx] += 1;
            if seen[idx].insert(record.caller_id.as_str()) {
                unique[idx] += 1;
            }
        }

        Self {
            days,
            unique,
            total,
        }
    }

    /// `MM/DD` label of each day, oldest first.
    pub fn date_labels(&self) -> [String; REPORT_DAYS] {
        self.days.map(|day| day.format(DATE_LABEL_FORMAT).to_string())
    }

    /// Encode into the chart payload.
    pub fn to_chart_data(&self) -> Result<ChartData, serde_json::Error> {
        let dates = self.date_labels();
        let unique = serde_json::to_string(&self.unique)?;
        let total = serde_json::to_string(&self.total)?;

        Ok(ChartData {
            from: dates[0].clone(),
            to: dates[REPORT_DAYS - 1].clone(),
            dates,
            unique,
            total,
        })
    }
}

/// Chart payload of the daily usage report.
///
/// `unique` and `total` hold JSON-encoded arrays so they can be embedded
/// directly into chart scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartData {
    /// `MM/DD` labels, oldest first.
    pub dates: [String; REPORT_DAYS],
    /// JSON array of distinct callers per day.
    pub unique: String,
    /// JSON array of requests per day.
    pub total: String,
    /// First label.
    pub from: String,
    /// Last label.
    pub to: String,
}

/// Build the chart payload from every persisted record.
pub async fn report(store: &RequestStore) -> Result<ChartData, AnalyticsError> {
    report_at(store, Utc::now()).await
}

/// Build the chart payload for the window ending at `now`.
pub async fn report_at(
    store: &RequestStore,
    now: DateTime<Utc>,
) -> Result<ChartData, AnalyticsError> {
    let records = store.load_all().await?;
    let usage = DailyUsage::compute(&records, now);
    Ok(usage.to_chart_data()?)
}
