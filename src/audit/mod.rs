//! Append-only audit trail of state-changing actions.
//!
//! Writers go through [`record`], which never fails: a sink error is logged
//! and dropped so that the triggering operation is unaffected. Entries are
//! written after the primary transaction commits.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

pub mod loggable;
pub mod store;

pub use loggable::Loggable;
pub use store::{list_entity_activity, verify_chain, ChainStatus, SqliteAuditLog};

/// Action names written to `activity_logs.action`.
pub mod actions {
    pub const TASK_CREATED: &str = "task_created";
    pub const STATUS_UPDATED: &str = "status_updated";
    pub const STATUS_CHANGE_REQUESTED: &str = "status_change_requested";
    pub const STATUS_REQUEST_APPROVED: &str = "status_request_approved";
    pub const STATUS_REQUEST_REJECTED: &str = "status_request_rejected";
    pub const CUSTOMER_CREATED: &str = "customer_created";
    pub const CUSTOMER_UPDATED: &str = "customer_updated";
    pub const CUSTOMER_DELETED: &str = "customer_deleted";
    pub const PROJECT_CREATED: &str = "project_created";
    pub const CONTACT_CREATED: &str = "contact_created";
    pub const USER_CREATED: &str = "user_created";
    pub const PASSWORD_CHANGED: &str = "password_changed";
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub performed_by: Uuid,
    pub message: Option<String>,
    pub meta: Value,
}

impl AuditEntry {
    pub fn new(entity_type: impl Into<String>, entity_id: Uuid, action: impl Into<String>, performed_by: Uuid) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            performed_by,
            message: None,
            meta: Value::Null,
        }
    }

    /// Entry about an entity implementing [`Loggable`].
    pub fn about<T: Loggable>(entity: &T, action: &str, performed_by: Uuid) -> Self {
        Self::new(T::entity_type(), entity.entity_id(), action, performed_by)
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = meta;
        self
    }
}

/// Destination for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()>;
}

/// Best-effort append. Failures are logged and never returned.
pub async fn record(sink: &dyn AuditSink, entry: AuditEntry) {
    if let Err(err) = sink.append(&entry).await {
        tracing::error!(
            error = %err,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            action = %entry.action,
            "failed to write audit entry"
        );
    }
}

/// Sink that keeps entries in memory; used by tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: std::sync::Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?;
        guard.push(entry.clone());
        Ok(())
    }
}
