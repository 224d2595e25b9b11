//! Storage Layer
//!
//! Embedded SQLite persistence for recorded requests:
//! - **Collection**: a single `requests` table of opaque keys and JSON values
//! - **Transactions**: batch inserts, scans and retention deletes are each atomic
//!
//! # Components
//!
//! - [`RequestStore`]: Transactional access to the `requests` collection
//! - [`RequestRecord`]: The persisted shape of one observed request
//! - [`PruneStats`]: Outcome of a retention pass

pub mod db;
mod error;
mod request_store;
mod schema;
mod types;

pub use error::StorageError;
pub use request_store::{PruneStats, RequestStore};
pub use schema::REQUESTS_TABLE;
pub use types::RequestRecord;
