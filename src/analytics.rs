//! Analytics Pipeline
//!
//! Buffered request ingestion with periodic persistence and reporting:
//! - **Recorder**: Enqueues request records onto a bounded tokio mpsc queue
//! - **Scheduler**: Background task flushing the queue every 30s and pruning weekly
//! - **Report**: Trailing 14-day totals and unique callers per UTC day
//!
//! # Example
//!
//! ```rust,ignore
//! use abacus::{AnalyticsBuilder, RequestInfo};
//!
//! let analytics = AnalyticsBuilder::new("sqlite:analytics.db").build().await?;
//! analytics.record(RequestInfo { path: "/api/contents".into(), ..Default::default() }).await;
//! let chart = analytics.report().await?;
//! analytics.close().await;
//! ```

mod builder;
mod error;
pub mod flush;
pub mod prune;
mod recorder;
pub mod report;
pub mod scheduler;

pub use builder::{Analytics, AnalyticsBuilder};
pub use error::AnalyticsError;
pub use recorder::{DEFAULT_EXTERNAL_MARKER, Recorder, RequestInfo, is_external};
pub use report::{ChartData, DailyUsage, REPORT_DAYS};
pub use scheduler::{DEFAULT_FLUSH_INTERVAL, DEFAULT_PRUNE_INTERVAL, DEFAULT_RETENTION, Schedule};
