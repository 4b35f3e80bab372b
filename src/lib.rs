pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::database::Store;
use crate::services::{
    ai_service::QuestionGenerator, session_service::SessionService, test_service::TestService,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub test_service: TestService,
    pub session_service: SessionService,
    pub jwt_secret: Arc<str>,
    pub api_rps: u32,
    pub cors_allowed_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn QuestionGenerator>,
        config: &Config,
    ) -> Self {
        let test_service = TestService::new(
            store.clone(),
            generator,
            Duration::from_secs(config.generation_timeout_secs),
            config.max_generated_questions,
        );
        let session_service = SessionService::new(store.clone(), config.submit_grace_secs);

        Self {
            store,
            test_service,
            session_service,
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
            api_rps: config.api_rps,
            cors_allowed_origins: Arc::from(config.cors_allowed_origins.clone()),
        }
    }
}
