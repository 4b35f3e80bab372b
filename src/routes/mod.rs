pub mod admin;
pub mod extract;
pub mod candidate;
pub mod health;

use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{from_fn, from_fn_with_state, Next},
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto::{session_dto, test_dto};
use crate::middleware::{
    auth::{require_bearer_auth, require_roles},
    cors::cors_layer,
    rate_limit::{rps_middleware, RateLimiter},
};
use crate::models::{question::Question, test_session, user::Role};
use crate::services::access_policy::{ADMIN_ONLY, ANY_ROLE, CANDIDATE_ONLY};
use crate::AppState;

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        tests::create_test,
        tests::list_tests,
        tests::get_test,
        tests::start_test,
        tests::save_progress,
        tests::submit_test,
        admin::assign_test,
        admin::update_cutoff,
        admin::list_sessions,
        admin::update_review_status,
        admin::abandon_session,
        candidate::dashboard,
        candidate::get_result,
    ),
    components(schemas(
        Question,
        Role,
        test_session::SessionStatus,
        test_session::ReviewStatus,
        test_dto::QuestionPayload,
        test_dto::CreateTestPayload,
        test_dto::CreateTestResponse,
        test_dto::UpdateSchedulePayload,
        test_dto::AssignTestPayload,
        test_dto::AssignTestResponse,
        test_dto::ScheduleResponse,
        test_dto::QuestionView,
        test_dto::CandidateTestView,
        test_dto::FullTestView,
        test_dto::TestView,
        session_dto::AnswerPayload,
        session_dto::SavedAnswerView,
        session_dto::StartSessionResponse,
        session_dto::SaveProgressRequest,
        session_dto::SaveProgressResponse,
        session_dto::SubmitSessionRequest,
        session_dto::SubmitSessionResponse,
        session_dto::ResultQuestionView,
        session_dto::SessionResultResponse,
        session_dto::ReviewStatusPayload,
        session_dto::ReviewStatusResponse,
        session_dto::SessionSummary,
        session_dto::SessionStatusResponse,
        session_dto::RecentTestEntry,
        session_dto::UpcomingTestEntry,
        session_dto::PerformanceSummary,
        session_dto::CandidateDashboardResponse,
    )),
    modifiers(&BearerAuth),
    tags((name = "edutest", description = "Test administration and scoring"))
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let admin_api = Router::new()
        .route(
            "/api/tests",
            post(tests::create_test).get(tests::list_tests),
        )
        .route("/api/admin/tests/assign", post(admin::assign_test))
        .route("/api/admin/tests/:id/cutoff", put(admin::update_cutoff))
        .route("/api/admin/test-sessions", get(admin::list_sessions))
        .route(
            "/api/admin/test-sessions/:id/review-status",
            put(admin::update_review_status),
        )
        .route(
            "/api/admin/test-sessions/:id/abandon",
            post(admin::abandon_session),
        )
        .route_layer(from_fn(|req: Request, next: Next| {
            require_roles(req, next, ADMIN_ONLY)
        }));

    let candidate_api = Router::new()
        .route("/api/tests/:id/start", post(tests::start_test))
        .route("/api/tests/:id/progress", put(tests::save_progress))
        .route("/api/tests/:id/submit", post(tests::submit_test))
        .route("/api/candidate/dashboard", get(candidate::dashboard))
        .route_layer(from_fn(|req: Request, next: Next| {
            require_roles(req, next, CANDIDATE_ONLY)
        }));

    let shared_api = Router::new()
        .route("/api/tests/:id", get(tests::get_test))
        .route(
            "/api/candidate/results/:session_id",
            get(candidate::get_result),
        )
        .route_layer(from_fn(|req: Request, next: Next| {
            require_roles(req, next, ANY_ROLE)
        }));

    let protected = admin_api
        .merge(candidate_api)
        .merge(shared_api)
        .layer(from_fn_with_state(
            RateLimiter::new(state.api_rps),
            rps_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), require_bearer_auth));

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/api/openapi.json", get(health::openapi_json));

    let cors = cors_layer(&state.cors_allowed_origins);

    public
        .merge(protected)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
