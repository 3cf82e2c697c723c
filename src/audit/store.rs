use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AuditEntry, AuditSink};
use crate::errors::AppError;
use crate::models::activity::{ActivityLog, DbActivityLog};
use crate::utils::utc_now;

/// Audit sink backed by the `activity_logs` table. Each row is chained to the
/// previous one by `hash = sha256(prev_hash || canonical row json)`.
///
/// Appends from this process are serialized. A writer from another process
/// that takes the same `seq` first makes the insert fail, and the append is
/// retried against the new chain head.
#[derive(Debug, Clone)]
pub struct SqliteAuditLog {
    pool: SqlitePool,
    append_lock: Arc<Mutex<()>>,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            append_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn try_append(&self, entry: &AuditEntry) -> Result<(), sqlx::Error> {
        // Dropping the transaction (cancelled request, failed commit) rolls it
        // back, so a pooled connection never keeps a write lock.
        let mut tx = self.pool.begin().await?;
        append_row(&mut *tx, entry).await?;
        tx.commit().await
    }
}

const APPEND_ATTEMPTS: usize = 5;

/// Another writer moved the chain head between our read and our insert.
fn lost_append_race(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_BUSY_SNAPSHOT
            db_err.is_unique_violation() || matches!(db_err.code().as_deref(), Some("5" | "6" | "517"))
        }
        _ => false,
    }
}

async fn append_row(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<(), sqlx::Error> {
    let last: Option<(i64, String)> = sqlx::query_as("SELECT seq, hash FROM activity_logs ORDER BY seq DESC LIMIT 1")
        .fetch_optional(&mut *conn)
        .await?;
    let (seq, prev_hash) = match last {
        Some((seq, hash)) => (seq + 1, Some(hash)),
        None => (1, None),
    };

    let meta = match &entry.meta {
        serde_json::Value::Null => None,
        value => Some(value.to_string()),
    };
    let created_at = utc_now();
    let hash = chain_hash(
        prev_hash.as_deref(),
        &HashedRow {
            seq,
            entity_type: &entry.entity_type,
            entity_id: entry.entity_id,
            action: &entry.action,
            performed_by: entry.performed_by,
            message: entry.message.as_deref(),
            meta: meta.as_deref(),
            created_at: timestamp(&created_at),
        },
    );

    sqlx::query(
        "INSERT INTO activity_logs (id, seq, entity_type, entity_id, action, performed_by, message, meta, prev_hash, hash, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4())
    .bind(seq)
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(&entry.action)
    .bind(entry.performed_by)
    .bind(&entry.message)
    .bind(&meta)
    .bind(&prev_hash)
    .bind(&hash)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait]
impl AuditSink for SqliteAuditLog {
    async fn append(&self, entry: &AuditEntry) -> anyhow::Result<()> {
        let _guard = self.append_lock.lock().await;
        let mut attempt = 1;
        loop {
            match self.try_append(entry).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < APPEND_ATTEMPTS && lost_append_race(&err) => {
                    tracing::debug!(attempt, error = %err, "audit append raced, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[derive(Serialize)]
struct HashedRow<'a> {
    seq: i64,
    entity_type: &'a str,
    entity_id: Uuid,
    action: &'a str,
    performed_by: Uuid,
    message: Option<&'a str>,
    meta: Option<&'a str>,
    created_at: String,
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn chain_hash(prev_hash: Option<&str>, row: &HashedRow<'_>) -> String {
    let mut hasher = Sha256::new();
    if let Some(prev) = prev_hash {
        hasher.update(prev.as_bytes());
    }
    // Serializing a struct of plain fields cannot fail.
    hasher.update(serde_json::to_vec(row).unwrap_or_default());
    hex::encode(hasher.finalize())
}

/// Result of re-walking the hash chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    Intact { entries: usize },
    /// First row whose stored hashes do not match the recomputed chain.
    Broken { seq: i64 },
}

pub async fn verify_chain(pool: &SqlitePool) -> Result<ChainStatus, AppError> {
    let rows = sqlx::query_as::<_, DbActivityLog>(
        "SELECT id, seq, entity_type, entity_id, action, performed_by, message, meta, prev_hash, hash, created_at
         FROM activity_logs ORDER BY seq ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut prev: Option<String> = None;
    for row in &rows {
        let expected = chain_hash(
            prev.as_deref(),
            &HashedRow {
                seq: row.seq,
                entity_type: &row.entity_type,
                entity_id: row.entity_id,
                action: &row.action,
                performed_by: row.performed_by,
                message: row.message.as_deref(),
                meta: row.meta.as_deref(),
                created_at: timestamp(&row.created_at),
            },
        );

        if row.prev_hash != prev || row.hash != expected {
            return Ok(ChainStatus::Broken { seq: row.seq });
        }
        prev = Some(row.hash.clone());
    }

    Ok(ChainStatus::Intact { entries: rows.len() })
}

/// Audit entries of one entity, oldest first.
pub async fn list_entity_activity(
    pool: &SqlitePool,
    entity_type: &str,
    entity_id: Uuid,
) -> Result<Vec<ActivityLog>, AppError> {
    let rows = sqlx::query_as::<_, DbActivityLog>(
        "SELECT id, seq, entity_type, entity_id, action, performed_by, message, meta, prev_hash, hash, created_at
         FROM activity_logs
         WHERE entity_type = ? AND entity_id = ?
         ORDER BY seq ASC",
    )
    .bind(entity_type)
    .bind(entity_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ActivityLog::try_from).collect()
}
