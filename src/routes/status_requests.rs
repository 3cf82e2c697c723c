use axum::extract::State;
use uuid::Uuid;

use crate::app::AppState;
use crate::errors::AppResult;
use crate::extract::{Json, Path};
use crate::jwt::AuthUser;
use crate::models::status_request::{DecisionRequest, DecisionResponse};
use crate::workflow;

#[utoipa::path(
    patch,
    path = "/status-requests/{id}",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Status change request id")),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Request decided", body = DecisionResponse),
        (status = 403, description = "Caller is not an approver"),
        (status = 404, description = "Request not found or already decided")
    )
)]
pub async fn decide_status_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    auth: AuthUser,
    Json(payload): Json<DecisionRequest>,
) -> AppResult<Json<DecisionResponse>> {
    let decided = workflow::decide(
        &state.pool,
        state.audit.as_ref(),
        &auth.principal,
        request_id,
        payload.decision,
        payload.decision_note,
    )
    .await?;

    Ok(Json(DecisionResponse {
        request: decided.request,
        task: decided.task,
    }))
}
