use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use uuid::Uuid;

use crate::{
    dto::session_dto::{CandidateDashboardResponse, SessionResultResponse},
    error::Result,
    models::user::AuthUser,
    routes::extract::ApiPath,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/candidate/dashboard",
    responses(
        (status = 200, description = "Recent results, upcoming tests and summary", body = CandidateDashboardResponse),
        (status = 403, description = "Caller is not a candidate")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse> {
    let dashboard = state.session_service.candidate_dashboard(&user).await?;
    Ok(Json(dashboard))
}

#[utoipa::path(
    get,
    path = "/api/candidate/results/{session_id}",
    params(
        ("session_id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Scored result with per-question breakdown", body = SessionResultResponse),
        (status = 403, description = "Session belongs to another candidate"),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session is still in progress")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn get_result(
    State(state): State<AppState>,
    user: AuthUser,
    ApiPath(session_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    let result = state.session_service.get_result(&user, session_id).await?;
    Ok(Json(result))
}
