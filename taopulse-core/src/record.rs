//! Append-only persistence records.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PersistenceError;
use crate::identity::{new_record_id, DurationMs, RecordId, RequestId, Timestamp};

/// Kind of a persisted record. Each kind is stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    /// Fresh dividend fetch from the upstream ledger.
    Dividends,
    /// Snapshot of one action pipeline run.
    Action,
}

impl RecordKind {
    pub const ALL: [RecordKind; 2] = [RecordKind::Dividends, RecordKind::Action];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dividends => "dividends",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub request_id: RequestId,
    pub kind: RecordKind,
    pub payload: serde_json::Value,
    pub duration_ms: DurationMs,
    pub created_at: Timestamp,
}

impl Record {
    pub fn new(
        request_id: RequestId,
        kind: RecordKind,
        payload: serde_json::Value,
        duration_ms: DurationMs,
    ) -> Self {
        Self {
            id: new_record_id(),
            request_id,
            kind,
            payload,
            duration_ms,
            created_at: Utc::now(),
        }
    }

    /// Build a record from any serializable payload.
    pub fn from_payload<P: Serialize>(
        request_id: RequestId,
        kind: RecordKind,
        payload: &P,
        duration_ms: DurationMs,
    ) -> Result<Self, PersistenceError> {
        let payload = serde_json::to_value(payload).map_err(|e| {
            PersistenceError::Serialization {
                reason: e.to_string(),
            }
        })?;
        Ok(Self::new(request_id, kind, payload, duration_ms))
    }
}
