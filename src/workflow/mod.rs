//! Task lifecycle: visibility-scoped reads, creation, the status state
//! machine and the ledger of status change requests.
//!
//! Every operation takes the acting [`Principal`](crate::authz::Principal)
//! explicitly. State changes run in one transaction each; audit entries are
//! recorded after commit through an [`AuditSink`](crate::audit::AuditSink).

pub mod ledger;
pub mod tasks;
pub mod transition;

pub use ledger::{decide, list_requests, submit, Decided};
pub use tasks::{create_task, get_task, list_tasks};
pub use transition::{set_task_status, StatusChange};

use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::status_request::{DbStatusChangeRequest, StatusChangeRequest};
use crate::models::task::{DbTask, Task};

/// Task columns plus the pending request, if any. The partial unique index on
/// `task_status_requests` keeps the join to at most one row per task.
pub(crate) const TASK_SELECT: &str = "SELECT t.id, t.title, t.description, t.task_date, t.department, t.assigned_to, t.created_by,
        t.customer_id, t.project_id, t.status, t.status_note,
        r.id AS pending_request_id, r.requested_status AS pending_requested_status,
        t.created_at, t.updated_at
 FROM tasks t
 LEFT JOIN task_status_requests r ON r.task_id = t.id AND r.decision = 'pending'";

/// Guard for updates that must not touch a closed task. Keep in step with
/// [`TaskStatus::is_closed`](crate::models::task::TaskStatus::is_closed).
pub(crate) const TASK_IS_OPEN: &str = "status NOT IN ('completed', 'cancelled', 'not_approved')";

pub(crate) const REQUEST_COLUMNS: &str = "id, task_id, requested_status, note, requested_by, required_approver_ids,
        decision, decided_by, decided_at, decision_note, created_at";

/// Loads a task without any visibility check.
pub(crate) async fn fetch_task_row<'e, E>(executor: E, task_id: Uuid) -> AppResult<Option<Task>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{TASK_SELECT} WHERE t.id = ?");
    let row = sqlx::query_as::<_, DbTask>(&sql)
        .bind(task_id)
        .fetch_optional(executor)
        .await?;

    row.map(Task::try_from).transpose()
}

pub(crate) async fn fetch_request_row<'e, E>(executor: E, request_id: Uuid) -> AppResult<Option<StatusChangeRequest>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM task_status_requests WHERE id = ?");
    let row = sqlx::query_as::<_, DbStatusChangeRequest>(&sql)
        .bind(request_id)
        .fetch_optional(executor)
        .await?;

    row.map(StatusChangeRequest::try_from).transpose()
}
