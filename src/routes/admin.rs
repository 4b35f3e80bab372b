use axum::{
    extract::State,
    response::{IntoResponse, Json},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::session_dto::{
        ReviewStatusPayload, ReviewStatusResponse, SessionListQuery, SessionStatusResponse,
        SessionSummary,
    },
    dto::test_dto::{AssignTestPayload, AssignTestResponse, ScheduleResponse, UpdateSchedulePayload},
    error::Result,
    routes::extract::{ApiJson, ApiPath, ApiQuery},
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/admin/tests/assign",
    request_body = AssignTestPayload,
    responses(
        (status = 200, description = "Candidate added to the roster", body = AssignTestResponse),
        (status = 404, description = "Test or candidate not found"),
        (status = 409, description = "Candidate already assigned")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn assign_test(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<AssignTestPayload>,
) -> Result<impl IntoResponse> {
    let test = state
        .test_service
        .assign_to_candidate(payload.test_id, payload.candidate_id)
        .await?;
    Ok(Json(AssignTestResponse {
        message: "Test assigned successfully".to_string(),
        test_id: test.id,
        candidate_id: payload.candidate_id,
        assigned_count: test.assigned_to.len(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/tests/{id}/cutoff",
    params(
        ("id" = Uuid, Path, description = "Test ID")
    ),
    request_body = UpdateSchedulePayload,
    responses(
        (status = 200, description = "Cut-off and schedule updated", body = ScheduleResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Test not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn update_cutoff(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateSchedulePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state.test_service.update_schedule(id, payload).await?;
    Ok(Json(ScheduleResponse {
        message: "Test updated successfully".to_string(),
        test_id: test.id,
        cutoff_mark: test.cutoff_mark,
        scheduled_date: test.scheduled_date,
        scheduled_time: test.scheduled_time,
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/test-sessions",
    params(SessionListQuery),
    responses(
        (status = 200, description = "Session summaries, newest first", body = [SessionSummary])
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SessionListQuery>,
) -> Result<impl IntoResponse> {
    let sessions = state.session_service.list_sessions(query.test_id).await?;
    Ok(Json(sessions))
}

#[utoipa::path(
    put,
    path = "/api/admin/test-sessions/{id}/review-status",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    request_body = ReviewStatusPayload,
    responses(
        (status = 200, description = "Review status updated", body = ReviewStatusResponse),
        (status = 400, description = "Unknown review status"),
        (status = 404, description = "Session not found")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn update_review_status(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<ReviewStatusPayload>,
) -> Result<impl IntoResponse> {
    let response = state
        .session_service
        .update_review_status(id, payload.review_status)
        .await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/admin/test-sessions/{id}/abandon",
    params(
        ("id" = Uuid, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session abandoned", body = SessionStatusResponse),
        (status = 404, description = "Session not found"),
        (status = 409, description = "Session already finished")
    ),
    security(("bearer" = []))
)]
#[axum::debug_handler]
pub async fn abandon_session(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse> {
    let session = state.session_service.abandon_session(id).await?;
    Ok(Json(SessionStatusResponse::from(&session)))
}
