use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivityLog {
    pub id: Uuid,
    pub seq: i64,
    #[schema(example = "task")]
    pub entity_type: String,
    pub entity_id: Uuid,
    #[schema(example = "status_change_requested")]
    pub action: String,
    pub performed_by: Uuid,
    pub message: Option<String>,
    #[schema(value_type = Object)]
    pub meta: Option<Value>,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbActivityLog {
    pub id: Uuid,
    pub seq: i64,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub performed_by: Uuid,
    pub message: Option<String>,
    pub meta: Option<String>,
    pub prev_hash: Option<String>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbActivityLog> for ActivityLog {
    type Error = AppError;

    fn try_from(value: DbActivityLog) -> Result<Self, Self::Error> {
        let meta = value.meta.as_deref().map(serde_json::from_str).transpose()?;

        Ok(ActivityLog {
            id: value.id,
            seq: value.seq,
            entity_type: value.entity_type,
            entity_id: value.entity_id,
            action: value.action,
            performed_by: value.performed_by,
            message: value.message,
            meta,
            prev_hash: value.prev_hash,
            hash: value.hash,
            created_at: value.created_at,
        })
    }
}
