use axum::extract::State;

use crate::app::AppState;
use crate::db::users::{authenticate, fetch_user_by_id};
use crate::errors::{AppError, AppResult};
use crate::extract::Json;
use crate::jwt::AuthUser;
use crate::models::user::{AuthResponse, LoginRequest, User};

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or disabled account")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_user = authenticate(&state.pool, &payload.email, &payload.password).await?;

    let token = state.jwt.encode(db_user.id)?;
    let user: User = db_user.try_into()?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(Json(AuthResponse { token, user }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))?;
    let user: User = db_user.try_into()?;
    Ok(Json(user))
}
