use crate::store::{HISTORY_KEY, Store};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Records kept; older ones fall off the end.
pub const MAX_RECORDS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Analysis,
    Cleaning,
    Optimization,
    Uninstall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Success,
    Failed,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub status: OperationStatus,
    pub details: Option<String>,
    pub items_processed: u64,
    pub space_freed: u64,
    /// Seconds.
    pub duration: f64,
    pub error_message: Option<String>,
}

impl OperationRecord {
    pub fn new(kind: OperationType, name: impl Into<String>, status: OperationStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: name.into(),
            timestamp: Utc::now(),
            status,
            details: None,
            items_processed: 0,
            space_freed: 0,
            duration: 0.0,
            error_message: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_items_processed(mut self, items: u64) -> Self {
        self.items_processed = items;
        self
    }

    #[must_use]
    pub fn with_space_freed(mut self, bytes: u64) -> Self {
        self.space_freed = bytes;
        self
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration.as_secs_f64();
        self
    }

    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Capped, newest-first history of finished operations.
///
/// Records are never edited once stored. Every change is written through to
/// the store when one is attached; a failed write is logged and the in-memory
/// history stays authoritative.
#[derive(Debug, Default)]
pub struct Ledger {
    records: Vec<OperationRecord>,
    store: Option<Store>,
}

impl Ledger {
    /// An unpersisted ledger.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(store: Store) -> Self {
        let mut records: Vec<OperationRecord> = store.load(HISTORY_KEY);
        records.truncate(MAX_RECORDS);
        Self {
            records,
            store: Some(store),
        }
    }

    pub fn record(&mut self, record: OperationRecord) {
        self.records.insert(0, record);
        self.records.truncate(MAX_RECORDS);
        self.persist();
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.persist();
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn total_space_freed(&self) -> u64 {
        self.records.iter().map(|r| r.space_freed).sum()
    }

    /// Percentage of successful operations, rounded. Zero when empty.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn success_rate(&self) -> u32 {
        if self.records.is_empty() {
            return 0;
        }
        let successes = self
            .records
            .iter()
            .filter(|r| r.status == OperationStatus::Success)
            .count();
        (successes as f64 / self.records.len() as f64 * 100.0).round() as u32
    }

    fn persist(&self) {
        if let Some(store) = &self.store
            && let Err(err) = store.save(HISTORY_KEY, &self.records)
        {
            warn!(%err, "cannot persist operation history");
        }
    }
}
