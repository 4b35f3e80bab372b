#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use edutest_backend::{
    config::Config,
    database::MemoryStore,
    error::Result,
    middleware::auth::Claims,
    models::{
        question::Question,
        user::{Role, User},
    },
    routes::build_router,
    services::ai_service::QuestionGenerator,
    AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use mockall::mock;
use serde_json::Value as JsonValue;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test_secret_key";

mock! {
    pub Generator {}

    #[async_trait]
    impl QuestionGenerator for Generator {
        async fn generate_questions(&self, source_text: &str, desired_count: usize) -> Result<Vec<Question>>;
    }
}

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".to_string(),
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        jwt_secret: JWT_SECRET.to_string(),
        gemini_api_key: "test-key".to_string(),
        gemini_model: "gemini-test".to_string(),
        generation_timeout_secs: 5,
        max_generated_questions: 50,
        submit_grace_secs: 30,
        session_sweep_interval_secs: 60,
        api_rps: 1000,
        cors_allowed_origins: Vec::new(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub admin: User,
    pub other_admin: User,
    pub candidate: User,
    pub other_candidate: User,
}

fn user(name: &str, role: Role) -> User {
    User {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        role,
    }
}

pub async fn spawn_app(generator: MockGenerator) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let admin = user("Ada Admin", Role::Admin);
    let other_admin = user("Otto Admin", Role::Admin);
    let candidate = user("Cara Candidate", Role::Candidate);
    let other_candidate = user("Cody Candidate", Role::Candidate);
    for u in [&admin, &other_admin, &candidate, &other_candidate] {
        store.insert_user(u.clone()).await;
    }

    let state = AppState::new(store.clone(), Arc::new(generator), &test_config());
    TestApp {
        router: build_router(state),
        store,
        admin,
        other_admin,
        candidate,
        other_candidate,
    }
}

pub fn token_for(sub: &str, role: Option<&str>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: role.map(str::to_string),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn token(user: &User) -> String {
    token_for(&user.id.to_string(), Some(user.role.as_str()))
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        bearer: Option<&str>,
        body: Option<JsonValue>,
    ) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.dispatch(req).await
    }

    /// Posts `raw` verbatim as an `application/json` body.
    pub async fn post_raw(&self, uri: &str, as_user: &User, raw: &str) -> (StatusCode, JsonValue) {
        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token(as_user)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw.to_string()))
            .unwrap();
        self.dispatch(req).await
    }

    async fn dispatch(&self, req: Request<Body>) -> (StatusCode, JsonValue) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            JsonValue::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str, as_user: &User) -> (StatusCode, JsonValue) {
        self.send(Method::GET, uri, Some(&token(as_user)), None).await
    }

    pub async fn post(&self, uri: &str, as_user: &User, body: JsonValue) -> (StatusCode, JsonValue) {
        self.send(Method::POST, uri, Some(&token(as_user)), Some(body)).await
    }

    pub async fn put(&self, uri: &str, as_user: &User, body: JsonValue) -> (StatusCode, JsonValue) {
        self.send(Method::PUT, uri, Some(&token(as_user)), Some(body)).await
    }

    /// Four questions whose correct option is 0, 1, 2, 3 in order; cut-off 2 of 4 marks.
    pub async fn create_sample_test(&self) -> Uuid {
        let (status, body) = self
            .post(
                "/api/tests",
                &self.admin,
                serde_json::json!({
                    "name": "Rust Basics",
                    "description": "Ownership and borrowing",
                    "notesContent": "private source notes",
                    "timeLimit": 30,
                    "negativeMarkingRatio": 0.25,
                    "cutoffMark": 2,
                    "questions": (0..4).map(|i| serde_json::json!({
                        "questionText": format!("Question {}", i + 1),
                        "options": ["a", "b", "c", "d"],
                        "correctOptionIndex": i,
                    })).collect::<Vec<_>>(),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        Uuid::parse_str(body["testId"].as_str().unwrap()).unwrap()
    }

    pub async fn assign(&self, test_id: Uuid, candidate: &User) -> (StatusCode, JsonValue) {
        self.post(
            "/api/admin/tests/assign",
            &self.admin,
            serde_json::json!({ "candidateId": candidate.id, "testId": test_id }),
        )
        .await
    }

    /// Question ids in test order, read through the creator's unredacted view.
    pub async fn question_ids(&self, test_id: Uuid) -> Vec<Uuid> {
        let (_, body) = self.get(&format!("/api/tests/{}", test_id), &self.admin).await;
        body["questions"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| Uuid::parse_str(q["id"].as_str().unwrap()).unwrap())
            .collect()
    }
}
