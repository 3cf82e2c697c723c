use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite};
use uuid::Uuid;

use crate::app::AppState;
use crate::audit::{actions, record, AuditEntry};
use crate::authz::{listing_scope, ordered_departments, Department, Principal, RoleKind};
use crate::db::users::{fetch_user_by_id, insert_user, update_password_hash, NewUser, USER_COLUMNS};
use crate::errors::{AppError, AppResult};
use crate::extract::{Json, Path, Query};
use crate::jwt::AuthUser;
use crate::models::user::{DbUser, PasswordChangeRequest, User, UserCreateRequest, UserListQuery};
use crate::utils::{hash_password, verify_password};

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Active users in the caller's scope", body = [User]),
        (status = 403, description = "Requested department is outside the caller's scope")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
    auth: AuthUser,
) -> AppResult<Json<Vec<User>>> {
    let Some(access) = listing_scope(&auth.principal, query.department.as_ref())? else {
        return Ok(Json(Vec::new()));
    };

    let mut builder = QueryBuilder::<Sqlite>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE is_active = 1"));
    access.push_filter(&mut builder, "department");
    builder.push(" ORDER BY full_name ASC");

    let rows = builder.build_query_as::<DbUser>().fetch_all(&state.pool).await?;
    let users = rows.into_iter().map(User::try_from).collect::<Result<Vec<_>, _>>()?;

    Ok(Json(users))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = UserCreateRequest,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Caller may not create this user"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<UserCreateRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let principal = &auth.principal;
    let department = payload.department.clone();
    ensure_may_create(principal, payload.role, &department)?;

    let email = payload.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("a valid email is required"));
    }
    let full_name = payload.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::bad_request("full_name is required"));
    }
    state.config.ensure_known_department(&department)?;

    let allowed_departments = match payload.role {
        RoleKind::CrossDepartment => {
            let allowed = cross_department_set(&department, payload.allowed_departments.unwrap_or_default());
            for code in &allowed {
                state.config.ensure_known_department(code)?;
            }
            allowed
        }
        _ => Vec::new(),
    };

    let password_hash = hash_password(&payload.password)?;
    let db_user = insert_user(
        &state.pool,
        NewUser {
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash,
            department,
            role: payload.role,
            allowed_departments,
        },
    )
    .await?;
    let user: User = db_user.try_into()?;

    tracing::info!(user_id = %user.id, role = %user.role, department = %user.department, "user created");
    record(
        state.audit.as_ref(),
        AuditEntry::about(&user, actions::USER_CREATED, principal.user_id)
            .message(format!("created user {}", user.email))
            .meta(json!({ "role": user.role, "department": user.department })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    patch,
    path = "/users/{id}/password",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = PasswordChangeRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password is wrong"),
        (status = 403, description = "Not allowed to change this password"),
        (status = 404, description = "User not found")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<PasswordChangeRequest>,
) -> AppResult<StatusCode> {
    let principal = &auth.principal;
    if !principal.is_admin() && principal.user_id != user_id {
        return Err(AppError::forbidden("only an admin may change another user's password"));
    }

    let target = fetch_user_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    if !principal.is_admin() {
        let current = payload
            .current_password
            .as_deref()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::bad_request("current_password is required"))?;
        if !verify_password(current, &target.password_hash)? {
            return Err(AppError::unauthorized("current password is incorrect"));
        }
    }

    let password_hash = hash_password(&payload.new_password)?;
    update_password_hash(&state.pool, user_id, &password_hash).await?;

    record(
        state.audit.as_ref(),
        AuditEntry::new("user", user_id, actions::PASSWORD_CHANGED, principal.user_id),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

/// Who may create which accounts: admins anything; managers only plain users
/// of their own department; everyone else nothing.
fn ensure_may_create(principal: &Principal, role: RoleKind, department: &Department) -> AppResult<()> {
    if !principal.can_manage_users() {
        return Err(AppError::forbidden("only managers and admins may create users"));
    }
    if principal.is_admin() {
        return Ok(());
    }
    if role != RoleKind::User {
        return Err(AppError::forbidden(format!("only an admin may create {role} accounts")));
    }
    if department != &principal.home_department {
        return Err(AppError::forbidden("users may only be created in your own department"));
    }
    Ok(())
}

/// Allowed departments in request order, with the home department appended
/// when missing.
fn cross_department_set(home: &Department, requested: Vec<Department>) -> Vec<Department> {
    ordered_departments(requested.into_iter().chain(std::iter::once(home.clone())))
}
