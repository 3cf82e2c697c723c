use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use super::{fetch_task_row, TASK_SELECT};
use crate::audit::{actions, record, AuditEntry, AuditSink};
use crate::authz::{ensure_department_access, is_visible, Principal, TaskVisibility};
use crate::config::AppConfig;
use crate::db::users::fetch_user_by_id;
use crate::errors::{AppError, AppResult};
use crate::models::clean_text;
use crate::models::task::{DbTask, Task, TaskCreateRequest, TaskListQuery, TaskStatus};
use crate::utils::utc_now;

/// Tasks visible to `principal`, newest first. Visibility is applied before
/// the optional filters.
pub async fn list_tasks(pool: &SqlitePool, principal: &Principal, query: &TaskListQuery) -> AppResult<Vec<Task>> {
    let visibility = TaskVisibility::for_principal(principal);
    if visibility.is_nothing() {
        return Ok(Vec::new());
    }

    let mut builder = QueryBuilder::<Sqlite>::new(TASK_SELECT);
    builder.push(" WHERE 1 = 1");
    visibility.push_predicate(&mut builder, "t");

    if let Some(status) = query.status {
        builder.push(" AND t.status = ").push_bind(status.as_str());
    }
    if let Some(assigned_to) = query.assigned_to {
        builder.push(" AND t.assigned_to = ").push_bind(assigned_to);
    }
    if let Some(customer_id) = query.customer_id {
        builder.push(" AND t.customer_id = ").push_bind(customer_id);
    }
    if let Some(project_id) = query.project_id {
        builder.push(" AND t.project_id = ").push_bind(project_id);
    }
    builder.push(" ORDER BY t.created_at DESC");

    let rows = builder.build_query_as::<DbTask>().fetch_all(pool).await?;
    rows.into_iter().map(Task::try_from).collect()
}

/// A single task. Tasks the principal may not see are reported as missing.
pub async fn get_task(pool: &SqlitePool, principal: &Principal, task_id: Uuid) -> AppResult<Task> {
    let task = fetch_task_row(pool, task_id)
        .await?
        .filter(|task| is_visible(principal, &task.department, task.assigned_to, task.created_by))
        .ok_or_else(|| AppError::not_found("task not found"))?;

    Ok(task)
}

pub async fn create_task(
    pool: &SqlitePool,
    audit: &dyn AuditSink,
    config: &AppConfig,
    principal: &Principal,
    payload: TaskCreateRequest,
) -> AppResult<Task> {
    let title = payload.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("title is required"));
    }

    let department = payload
        .department
        .filter(|department| !department.is_blank())
        .unwrap_or_else(|| principal.home_department.clone());
    config.ensure_known_department(&department)?;
    ensure_department_access(principal, &department)?;

    let assigned_to = payload.assigned_to.unwrap_or(principal.user_id);
    if assigned_to != principal.user_id && !principal.can_manage_users() {
        return Err(AppError::forbidden(
            "only managers and admins may assign a task to someone else",
        ));
    }
    let assignee_active = fetch_user_by_id(pool, assigned_to)
        .await?
        .map(|user| user.is_active)
        .unwrap_or(false);
    if !assignee_active {
        return Err(AppError::bad_request("assignee must be an active user"));
    }

    if let Some(customer_id) = payload.customer_id {
        ensure_exists(pool, "customers", customer_id, "customer not found").await?;
    }
    if let Some(project_id) = payload.project_id {
        ensure_exists(pool, "projects", project_id, "project not found").await?;
    }

    let task_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO tasks (id, customer_id, project_id, title, description, task_date, department, assigned_to, created_by, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(task_id)
    .bind(payload.customer_id)
    .bind(payload.project_id)
    .bind(&title)
    .bind(clean_text(payload.description))
    .bind(payload.task_date)
    .bind(department.as_str())
    .bind(assigned_to)
    .bind(principal.user_id)
    .bind(TaskStatus::Pending.as_str())
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let task = fetch_task_row(pool, task_id)
        .await?
        .ok_or_else(|| AppError::internal("task vanished after insert"))?;

    record(
        audit,
        AuditEntry::about(&task, actions::TASK_CREATED, principal.user_id)
            .message(format!("created task {}", task.title))
            .meta(json!({ "department": task.department, "assigned_to": task.assigned_to })),
    )
    .await;

    Ok(task)
}

async fn ensure_exists(pool: &SqlitePool, table: &str, id: Uuid, message: &str) -> AppResult<()> {
    let sql = format!("SELECT COUNT(1) FROM {table} WHERE id = ?");
    let count: i64 = sqlx::query_scalar(&sql).bind(id).fetch_one(pool).await?;
    if count == 0 {
        return Err(AppError::bad_request(message));
    }
    Ok(())
}
