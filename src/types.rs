//! Core value types shared across the engine.
//!
//! These are the types that cross the boundary between the engine and its
//! adapters: the opaque [`ContinuationToken`] cursor, individual
//! [`ChangeRecord`]s, and the ordered [`ChangeBatch`] a single poll returns.
//!
//! Everything here is plain data. Semantics (ownership, checkpointing,
//! delivery) live in [`crate::engine`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque cursor marking a processed position within a partition's change
/// order.
///
/// The engine never inspects the contents; only the change source that
/// produced a token can interpret it. An absent token means "start from the
/// configured start time".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw token value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContinuationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ContinuationToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ContinuationToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A single change document pulled from a source partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Source document id.
    pub id: String,

    /// Logical timestamp of the change in the source's change order.
    ///
    /// Used for ordering within a partition and for the run-window boundary
    /// check.
    pub ts: DateTime<Utc>,

    /// The change payload as the source produced it.
    pub body: serde_json::Value,
}

impl ChangeRecord {
    /// Create a record from its parts.
    pub fn new(id: impl Into<String>, ts: DateTime<Utc>, body: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            ts,
            body,
        }
    }
}

/// An ordered group of change records returned by one poll, together with
/// the cursor positioned after the last record.
///
/// Records are in the source's native order; the engine delivers the batch
/// to the handler as a unit and only advances the checkpoint to
/// `next_token` after the handler succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// The partition these changes came from.
    pub partition_id: String,

    /// The change records, ordered by `ts`.
    pub records: Vec<ChangeRecord>,

    /// Cursor after the last record in `records`.
    ///
    /// For an empty batch this equals the cursor the poll started from.
    pub next_token: ContinuationToken,
}

impl ChangeBatch {
    /// True when the poll found no new changes.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Timestamp of the last record, if any.
    pub fn last_ts(&self) -> Option<DateTime<Utc>> {
        self.records.last().map(|r| r.ts)
    }
}
