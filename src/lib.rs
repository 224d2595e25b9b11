//! Abacus - Self-hosted API Request Analytics
//!
//! This crate records inbound API requests without blocking request
//! handlers, persists them in batches to an embedded SQLite file, drops
//! records past a retention window, and reports daily usage for the
//! trailing 14 days. It can be embedded as a library or run as the
//! standalone `abacus` binary.
//!
//! # Architecture
//!
//! - **Analytics**: Recorder, bounded queue, background scheduler and report
//! - **Storage**: Transactional `requests` collection on SQLite (sqlx)
//! - **Server**: Axum routes for ingestion, reports and health probes
//!
//! # Example
//!
//! ```rust,ignore
//! use abacus::{AnalyticsBuilder, server::{AppState, create_router}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analytics = AnalyticsBuilder::new("sqlite:analytics.db").build().await?;
//!     let app = create_router(AppState {
//!         recorder: analytics.recorder(),
//!         store: analytics.store(),
//!     });
//!     // serve `app`, then:
//!     analytics.close().await;
//!     Ok(())
//! }
//! ```

pub mod analytics;
pub mod config;
pub mod server;
pub mod storage;

pub use analytics::{
    Analytics, AnalyticsBuilder, AnalyticsError, ChartData, DailyUsage, Recorder, RequestInfo,
};
pub use storage::{PruneStats, RequestRecord, RequestStore, StorageError};
