//! Core data types for the storage layer.
//!
//! - [`RequestRecord`]: one observed API request, as queued and as persisted
//!   in the `requests` collection.

use serde::{Deserialize, Serialize};

/// A recorded API request.
///
/// Records are created once by the recorder and never mutated afterwards.
/// The serialized field names are the persisted layout of the `requests`
/// collection.
///
/// # Example
///
/// ```
/// use abacus::RequestRecord;
///
/// let record = RequestRecord {
///     url: "/api/contents?type=Song".to_string(),
///     method: "GET".to_string(),
///     origin: String::new(),
///     protocol: "HTTP/1.1".to_string(),
///     caller_id: "10.0.0.7:51234".to_string(),
///     timestamp: 1_700_000_000_000,
///     external: false,
/// };
/// let json = serde_json::to_value(&record).unwrap();
/// assert_eq!(json["ip_address"], "10.0.0.7:51234");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Full request target (path and query).
    pub url: String,
    /// HTTP verb.
    #[serde(rename = "http_method")]
    pub method: String,
    /// Caller-declared `Origin` header, empty when absent.
    pub origin: String,
    /// Wire protocol label, e.g. `HTTP/1.1`.
    #[serde(rename = "http_protocol")]
    pub protocol: String,
    /// Network identity of the caller (`address:port`).
    #[serde(rename = "ip_address")]
    pub caller_id: String,
    /// Enqueue time in Unix milliseconds.
    pub timestamp: i64,
    /// Whether the request hit an externally-facing route.
    pub external: bool,
}
