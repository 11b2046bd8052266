//! Processed-event receipts (`eventos_processados`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    /// The handler changed state.
    Applied,
    /// The guard found the event already applied.
    Noop,
    /// The event can never succeed as recorded.
    Failed,
    /// The last dispatch failed; the event is retried after `nextAttemptAt`.
    Deferred,
}

impl ReceiptStatus {
    /// Returns true if the event is done with, successfully or not.
    pub fn is_settled(&self) -> bool {
        !matches!(self, ReceiptStatus::Deferred)
    }
}

/// One per event id. A settled receipt marks the event as handled; a
/// deferred one is replaced on the next dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedReceipt {
    pub event_id: String,
    pub event_type: String,
    pub status: ReceiptStatus,
    pub processed_at: DateTime<Utc>,
    pub attempts: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub successors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Failed dispatches so far.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failures: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<DateTime<Utc>>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl ProcessedReceipt {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        status: ReceiptStatus,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            status,
            processed_at,
            attempts: 1,
            successors: Vec::new(),
            error_kind: None,
            error: None,
            failures: 0,
            next_attempt_at: None,
        }
    }

    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        processed_at: DateTime<Utc>,
        kind: &str,
        error: impl Into<String>,
    ) -> Self {
        let mut receipt = Self::new(event_id, event_type, ReceiptStatus::Failed, processed_at);
        receipt.error_kind = Some(kind.to_string());
        receipt.error = Some(error.into());
        receipt
    }

    pub fn deferred(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        processed_at: DateTime<Utc>,
        kind: &str,
        error: impl Into<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Self {
        let mut receipt = Self::failed(event_id, event_type, processed_at, kind, error);
        receipt.status = ReceiptStatus::Deferred;
        receipt.next_attempt_at = Some(next_attempt_at);
        receipt
    }

    /// Returns true if the poller should hand this event out at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ReceiptStatus::Deferred => self.next_attempt_at.is_none_or(|at| at <= now),
            _ => false,
        }
    }
}
