use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::tasks::get_task;
use super::transition::{ensure_assignee, ensure_open};
use super::{fetch_request_row, fetch_task_row, REQUEST_COLUMNS, TASK_IS_OPEN};
use crate::audit::{actions, record, AuditEntry, AuditSink};
use crate::authz::{may_decide, required_approvers, Principal};
use crate::errors::{AppError, AppResult};
use crate::models::clean_text;
use crate::models::status_request::{Decision, DbStatusChangeRequest, StatusChangeRequest, Verdict};
use crate::models::task::{Task, TaskStatus};
use crate::utils::utc_now;

const ALREADY_PENDING: &str = "a status change request is already pending for this task";
const ALREADY_DECIDED: &str = "status change request has already been decided";

/// Result of deciding a request: the resolved request and the task after it.
#[derive(Debug, Clone)]
pub struct Decided {
    pub request: StatusChangeRequest,
    pub task: Task,
}

/// Files a request to move a task into a restricted status.
///
/// The task's status does not change. At most one request per task may be
/// pending.
pub async fn submit(
    pool: &SqlitePool,
    audit: &dyn AuditSink,
    principal: &Principal,
    task_id: Uuid,
    requested_status: TaskStatus,
    note: Option<String>,
) -> AppResult<StatusChangeRequest> {
    if !requested_status.is_restricted() {
        return Err(AppError::bad_request(format!(
            "{requested_status} does not require approval"
        )));
    }

    let task = get_task(pool, principal, task_id).await?;
    ensure_assignee(principal, &task)?;
    ensure_open(&task)?;

    let note = clean_text(note);
    if requested_status.requires_note() && note.is_none() {
        return Err(AppError::bad_request(format!("a note is required to request {requested_status}")));
    }

    let request_id = Uuid::new_v4();
    let approvers = required_approvers(task.created_by);

    let pending: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM task_status_requests WHERE task_id = ? AND decision = 'pending'")
            .bind(task_id)
            .fetch_optional(pool)
            .await?;
    if pending.is_some() {
        return Err(AppError::conflict(ALREADY_PENDING));
    }

    // Single-statement insert; a concurrent submit loses on the partial unique index.
    sqlx::query(
        "INSERT INTO task_status_requests (id, task_id, requested_status, note, requested_by, required_approver_ids, decision, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(request_id)
    .bind(task_id)
    .bind(requested_status.as_str())
    .bind(&note)
    .bind(principal.user_id)
    .bind(serde_json::to_string(&approvers)?)
    .bind(utc_now())
    .execute(pool)
    .await
    .map_err(|err| AppError::conflict_on_unique(err, ALREADY_PENDING))?;

    let request = fetch_request_row(pool, request_id)
        .await?
        .ok_or_else(|| AppError::internal("status change request vanished after insert"))?;

    tracing::info!(task_id = %task_id, request_id = %request_id, requested = %requested_status, "status change requested");
    record(
        audit,
        AuditEntry::about(&task, actions::STATUS_CHANGE_REQUESTED, principal.user_id)
            .message(format!("requested status {requested_status}"))
            .meta(json!({
                "request_id": request_id,
                "from": task.status,
                "requested_status": requested_status,
                "note": note,
                "required_approver_ids": approvers,
            })),
    )
    .await;

    Ok(request)
}

/// Resolves a pending request exactly once.
///
/// Approval sets the task status and note from the request in the same
/// transaction; rejection leaves the task untouched.
pub async fn decide(
    pool: &SqlitePool,
    audit: &dyn AuditSink,
    principal: &Principal,
    request_id: Uuid,
    verdict: Verdict,
    decision_note: Option<String>,
) -> AppResult<Decided> {
    let request = fetch_request_row(pool, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("status change request not found"))?;
    if !request.is_pending() {
        return Err(AppError::not_found(ALREADY_DECIDED));
    }

    let task = fetch_task_row(pool, request.task_id)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    if !may_decide(principal, task.created_by, &request.required_approver_ids) {
        return Err(AppError::forbidden("not an approver for this status change request"));
    }

    let decision = Decision::from(verdict);
    if decision == Decision::Approved {
        // A direct change may have closed the task while the request waited.
        ensure_open(&task)?;
    }
    let decision_note = clean_text(decision_note);
    let now = utc_now();

    let mut tx = pool.begin().await?;

    let marked = sqlx::query(
        "UPDATE task_status_requests SET decision = ?, decided_by = ?, decided_at = ?, decision_note = ?
         WHERE id = ? AND decision = 'pending'",
    )
    .bind(decision.as_str())
    .bind(principal.user_id)
    .bind(now)
    .bind(&decision_note)
    .bind(request_id)
    .execute(&mut *tx)
    .await?;

    if marked.rows_affected() == 0 {
        return Err(AppError::not_found(ALREADY_DECIDED));
    }

    if decision == Decision::Approved {
        let sql = format!("UPDATE tasks SET status = ?, status_note = ?, updated_at = ? WHERE id = ? AND {TASK_IS_OPEN}");
        let applied = sqlx::query(&sql)
            .bind(request.requested_status.as_str())
            .bind(&request.note)
            .bind(now)
            .bind(task.id)
            .execute(&mut *tx)
            .await?;
        if applied.rows_affected() == 0 {
            return Err(AppError::bad_request("task is closed"));
        }
    }

    tx.commit().await?;

    let request = fetch_request_row(pool, request_id)
        .await?
        .ok_or_else(|| AppError::not_found("status change request not found"))?;
    let updated = fetch_task_row(pool, task.id)
        .await?
        .ok_or_else(|| AppError::not_found("task not found"))?;

    let action = match decision {
        Decision::Approved => actions::STATUS_REQUEST_APPROVED,
        _ => actions::STATUS_REQUEST_REJECTED,
    };
    tracing::info!(request_id = %request_id, task_id = %task.id, decision = %decision, "status change request decided");
    record(
        audit,
        AuditEntry::about(&updated, action, principal.user_id)
            .message(format!("{} request for {}", decision, request.requested_status))
            .meta(json!({
                "request_id": request_id,
                "requested_status": request.requested_status,
                "previous_status": task.status,
                "decision_note": decision_note,
            })),
    )
    .await;

    Ok(Decided { request, task: updated })
}

/// Request history of a visible task, newest first.
pub async fn list_requests(pool: &SqlitePool, principal: &Principal, task_id: Uuid) -> AppResult<Vec<StatusChangeRequest>> {
    let task = get_task(pool, principal, task_id).await?;

    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM task_status_requests WHERE task_id = ? ORDER BY created_at DESC, id"
    );
    let rows = sqlx::query_as::<_, DbStatusChangeRequest>(&sql)
        .bind(task.id)
        .fetch_all(pool)
        .await?;

    rows.into_iter().map(StatusChangeRequest::try_from).collect()
}
