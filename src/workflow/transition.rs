use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::ledger::submit;
use super::tasks::get_task;
use super::{fetch_task_row, TASK_IS_OPEN};
use crate::audit::{actions, record, AuditEntry, AuditSink};
use crate::authz::Principal;
use crate::errors::{AppError, AppResult};
use crate::models::clean_text;
use crate::models::status_request::StatusChangeRequest;
use crate::models::task::{Task, TaskStatus};
use crate::utils::utc_now;

/// What a status change did to the task.
#[derive(Debug, Clone)]
pub enum StatusChange {
    /// Direct status; the task was updated.
    Applied(Task),
    /// Restricted status; the task is unchanged and a request awaits approval.
    PendingApproval(StatusChangeRequest),
}

pub(crate) fn ensure_assignee(principal: &Principal, task: &Task) -> AppResult<()> {
    if task.assigned_to != principal.user_id {
        return Err(AppError::forbidden("only the assignee may change the status of this task"));
    }
    Ok(())
}

pub(crate) fn ensure_open(task: &Task) -> AppResult<()> {
    if task.status.is_closed() {
        return Err(AppError::bad_request(format!("task is closed ({})", task.status)));
    }
    Ok(())
}

/// Changes a task's status on behalf of its assignee.
///
/// `pending`, `in_progress` and `not_approved` are written directly.
/// `completed`, `cancelled` and `postponed` only create a status change request.
pub async fn set_task_status(
    pool: &SqlitePool,
    audit: &dyn AuditSink,
    principal: &Principal,
    task_id: Uuid,
    status: TaskStatus,
    note: Option<String>,
) -> AppResult<StatusChange> {
    if status.is_restricted() {
        let request = submit(pool, audit, principal, task_id, status, note).await?;
        return Ok(StatusChange::PendingApproval(request));
    }

    let task = get_task(pool, principal, task_id).await?;
    ensure_assignee(principal, &task)?;
    ensure_open(&task)?;

    let note = clean_text(note);
    let sql = format!(
        "UPDATE tasks SET status = ?, status_note = ?, updated_at = ? WHERE id = ? AND assigned_to = ? AND {TASK_IS_OPEN}"
    );
    let result = sqlx::query(&sql)
        .bind(status.as_str())
        .bind(&note)
        .bind(utc_now())
        .bind(task_id)
        .bind(principal.user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        // Lost a race against a reassignment or an approval.
        let current = fetch_task_row(pool, task_id)
            .await?
            .ok_or_else(|| AppError::not_found("task not found"))?;
        ensure_assignee(principal, &current)?;
        ensure_open(&current)?;
        return Err(AppError::conflict("task changed while updating its status"));
    }

    let updated = fetch_task_row(pool, task_id)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    tracing::info!(task_id = %task_id, from = %task.status, to = %status, "task status updated");
    record(
        audit,
        AuditEntry::about(&updated, actions::STATUS_UPDATED, principal.user_id)
            .message(format!("status changed from {} to {}", task.status, status))
            .meta(json!({ "from": task.status, "to": status, "note": note })),
    )
    .await;

    Ok(StatusChange::Applied(updated))
}
