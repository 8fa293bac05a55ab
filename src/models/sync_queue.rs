use std::fmt;

use serde_json::Value;

/// Kind of entity a queued mutation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Invoice,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Invoice => "invoice",
        }
    }
}

/// Operations the drain knows how to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    CreateInvoice,
    DeleteInvoice,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperation::CreateInvoice => "create_invoice",
            SyncOperation::DeleteInvoice => "delete_invoice",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create_invoice" => Some(SyncOperation::CreateInvoice),
            "delete_invoice" => Some(SyncOperation::DeleteInvoice),
            _ => None,
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pending local mutation awaiting remote confirmation.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct SyncQueueEntry {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: String,
    pub payload: String,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
}

impl SyncQueueEntry {
    /// `None` for operation names this build does not replay.
    pub fn operation(&self) -> Option<SyncOperation> {
        SyncOperation::parse(&self.operation)
    }

    pub fn payload_json(&self) -> serde_json::Result<Value> {
        serde_json::from_str(&self.payload)
    }
}

/// A mutation about to be queued.
#[derive(Debug, Clone)]
pub struct NewSyncEntry {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub payload: Value,
}

impl NewSyncEntry {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        operation: SyncOperation,
        payload: Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation,
            payload,
        }
    }
}
