use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{actions, record, AuditEntry};
use crate::authz::{ensure_department_access, listing_scope};
use crate::errors::{AppError, AppResult};
use crate::extract::{Json, Query};
use crate::jwt::AuthUser;
use crate::models::clean_text;
use crate::models::project::{DbProject, Project, ProjectCreateRequest, ProjectListQuery};
use crate::routes::customers::fetch_customer;
use crate::utils::utc_now;

const PROJECT_COLUMNS: &str =
    "id, customer_id, project_name, project_type, description, status, department, created_by, created_at, updated_at";

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    params(ProjectListQuery),
    responses(
        (status = 200, description = "Projects in the caller's scope", body = [Project]),
        (status = 403, description = "Requested department is outside the caller's scope")
    )
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ProjectListQuery>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Project>>> {
    let Some(access) = listing_scope(&auth.principal, query.department.as_ref())? else {
        return Ok(Json(Vec::new()));
    };

    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE 1 = 1"));
    access.push_filter(&mut builder, "department");
    if let Some(customer_id) = query.customer_id {
        builder.push(" AND customer_id = ").push_bind(customer_id);
    }
    builder.push(" ORDER BY created_at DESC");

    let rows = builder.build_query_as::<DbProject>().fetch_all(&state.pool).await?;
    let projects = rows.into_iter().map(Project::try_from).collect::<Result<Vec<_>, _>>()?;

    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = ProjectCreateRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "No access to the customer's department"),
        (status = 404, description = "Customer not found")
    )
)]
pub async fn create_project(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ProjectCreateRequest>,
) -> AppResult<(StatusCode, Json<Project>)> {
    let principal = &auth.principal;
    let project_name = payload.project_name.trim().to_string();
    if project_name.is_empty() {
        return Err(AppError::bad_request("project_name is required"));
    }

    let customer = fetch_customer(&state.pool, payload.customer_id).await?;
    ensure_department_access(principal, &customer.department)?;

    let department = payload
        .department
        .filter(|department| !department.is_blank())
        .unwrap_or_else(|| customer.department.clone());
    state.config.ensure_known_department(&department)?;
    ensure_department_access(principal, &department)?;

    let project_id = Uuid::new_v4();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO projects (id, customer_id, project_name, project_type, description, status, department, created_by, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(project_id)
    .bind(customer.id)
    .bind(&project_name)
    .bind(clean_text(payload.project_type))
    .bind(clean_text(payload.description))
    .bind(clean_text(payload.status).unwrap_or_else(|| "open".to_string()))
    .bind(department.as_str())
    .bind(principal.user_id)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let project = fetch_project(&state.pool, project_id).await?;
    record(
        state.audit.as_ref(),
        AuditEntry::about(&project, actions::PROJECT_CREATED, principal.user_id)
            .message(format!("created project {}", project.project_name))
            .meta(json!({ "customer_id": customer.id, "department": project.department })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(project)))
}

async fn fetch_project(pool: &SqlitePool, project_id: Uuid) -> AppResult<Project> {
    let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?");
    let row = sqlx::query_as::<_, DbProject>(&sql)
        .bind(project_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("project not found"))?;

    row.try_into()
}
