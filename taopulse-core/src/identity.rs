//! Identity and time primitives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Record identifier using UUIDv7 for timestamp-sortable IDs.
pub type RecordId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Duration in milliseconds for stage timings.
pub type DurationMs = i64;

/// Subnet identifier (netuid) on the upstream ledger.
pub type SubnetId = u16;

/// Number of hex characters kept in a request id.
pub const REQUEST_ID_LEN: usize = 12;

/// Generate a new UUIDv7 record id (timestamp-sortable).
pub fn new_record_id() -> RecordId {
    Uuid::now_v7()
}

/// Short correlation id attached to every log line and record of one query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh id from the random tail of a UUID.
    pub fn generate() -> Self {
        let hex = Uuid::now_v7().simple().to_string();
        Self(hex[hex.len() - REQUEST_ID_LEN..].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_shape() {
        let id = RequestId::generate();
        assert_eq!(id.as_str().len(), REQUEST_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_request_ids_differ() {
        assert_ne!(RequestId::generate(), RequestId::generate());
    }

    #[test]
    fn test_record_ids_sort_by_creation() {
        let first = new_record_id();
        let second = new_record_id();
        assert!(first < second);
    }
}
