use axum::extract::State;
use axum::http::StatusCode;
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{list_entity_activity, Loggable};
use crate::errors::AppResult;
use crate::extract::{Json, Path, Query};
use crate::jwt::AuthUser;
use crate::models::activity::ActivityLog;
use crate::models::status_request::{StatusChangeRequest, StatusChangeResponse};
use crate::models::task::{Task, TaskCreateRequest, TaskListQuery, TaskStatusUpdateRequest};
use crate::workflow::{self, StatusChange};

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    params(TaskListQuery),
    responses((status = 200, description = "Tasks visible to the caller", body = [Task]))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Task>>> {
    let tasks = workflow::list_tasks(&state.pool, &auth.principal, &query).await?;
    Ok(Json(tasks))
}

#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    request_body = TaskCreateRequest,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Department or assignment not allowed")
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<TaskCreateRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = workflow::create_task(
        &state.pool,
        state.audit.as_ref(),
        &state.config,
        &auth.principal,
        payload,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "Task detail", body = Task),
        (status = 404, description = "Task not found or not visible")
    )
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Task>> {
    let task = workflow::get_task(&state.pool, &auth.principal, task_id).await?;
    Ok(Json(task))
}

#[utoipa::path(
    patch,
    path = "/tasks/{id}/status",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    request_body = TaskStatusUpdateRequest,
    responses(
        (status = 200, description = "Status applied", body = StatusChangeResponse),
        (status = 202, description = "Status change request awaiting approval", body = StatusChangeResponse),
        (status = 400, description = "Missing note or closed task"),
        (status = 403, description = "Caller is not the assignee"),
        (status = 409, description = "A request is already pending")
    )
)]
pub async fn set_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<TaskStatusUpdateRequest>,
) -> AppResult<(StatusCode, Json<StatusChangeResponse>)> {
    let change = workflow::set_task_status(
        &state.pool,
        state.audit.as_ref(),
        &auth.principal,
        task_id,
        payload.status,
        payload.note,
    )
    .await?;

    let (status, body) = match change {
        StatusChange::Applied(task) => (
            StatusCode::OK,
            StatusChangeResponse {
                outcome: "applied".to_string(),
                task: Some(task),
                request: None,
            },
        ),
        StatusChange::PendingApproval(request) => (
            StatusCode::ACCEPTED,
            StatusChangeResponse {
                outcome: "pending_approval".to_string(),
                task: None,
                request: Some(request),
            },
        ),
    };

    Ok((status, Json(body)))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}/status-requests",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "Status change requests, newest first", body = [StatusChangeRequest]))
)]
pub async fn list_status_requests(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Vec<StatusChangeRequest>>> {
    let requests = workflow::list_requests(&state.pool, &auth.principal, task_id).await?;
    Ok(Json(requests))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}/activity",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Task id")),
    responses((status = 200, description = "Audit trail of the task", body = [ActivityLog]))
)]
pub async fn list_task_activity(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    auth: AuthUser,
) -> AppResult<Json<Vec<ActivityLog>>> {
    let task = workflow::get_task(&state.pool, &auth.principal, task_id).await?;
    let entries = list_entity_activity(&state.pool, Task::entity_type(), task.id).await?;
    Ok(Json(entries))
}
