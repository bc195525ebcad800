//! Writes queued for replay against the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationOp {
    /// Insert-or-merge keyed by the row's own (client-generated) id
    Upsert,
    /// Replace the row with the full payload
    Update { record_id: String },
    Delete { record_id: String },
}

/// A write made while the backend was unreachable.
///
/// Every variant is safe to replay: upserts are keyed by an id generated on
/// the till, updates carry the whole record, and deleting a missing row is
/// not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct PendingMutation {
    pub id: Uuid,
    pub table: String,
    pub op: MutationOp,
    pub payload: Value,
    /// Version of the row this write was based on, if known
    #[serde(default)]
    pub expected_version: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl PendingMutation {
    fn new(table: &str, op: MutationOp, payload: Value, expected_version: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            table: table.to_string(),
            op,
            payload,
            expected_version,
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    pub fn upsert<T: Serialize>(table: &str, row: &T) -> serde_json::Result<Self> {
        Ok(Self::new(table, MutationOp::Upsert, serde_json::to_value(row)?, None))
    }

    pub fn update<T: Serialize>(
        table: &str,
        record_id: &str,
        row: &T,
        expected_version: Option<String>,
    ) -> serde_json::Result<Self> {
        Ok(Self::new(
            table,
            MutationOp::Update {
                record_id: record_id.to_string(),
            },
            serde_json::to_value(row)?,
            expected_version,
        ))
    }

    pub fn delete(table: &str, record_id: &str) -> Self {
        Self::new(
            table,
            MutationOp::Delete {
                record_id: record_id.to_string(),
            },
            Value::Null,
            None,
        )
    }

    /// The row this mutation targets, when it names one.
    pub fn record_id(&self) -> Option<&str> {
        match &self.op {
            MutationOp::Upsert => self.payload.get("id").and_then(Value::as_str),
            MutationOp::Update { record_id } | MutationOp::Delete { record_id } => {
                Some(record_id.as_str())
            }
        }
    }

    /// Short description for logs and toasts.
    pub fn describe(&self) -> String {
        match &self.op {
            MutationOp::Upsert => format!("save to {}", self.table),
            MutationOp::Update { record_id } => format!("update {} {}", self.table, record_id),
            MutationOp::Delete { record_id } => format!("delete {} {}", self.table, record_id),
        }
    }
}
