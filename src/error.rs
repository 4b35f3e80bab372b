use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    InvalidPayload(#[from] validator::ValidationErrors),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Question generation failed: {0}")]
    UpstreamGeneration(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid request body: {0}")]
    JsonBody(#[from] JsonRejection),

    #[error("Invalid path parameter: {0}")]
    PathParam(#[from] PathRejection),

    #[error("Invalid query string: {0}")]
    QueryParam(#[from] QueryRejection),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_)
            | Error::InvalidPayload(_)
            | Error::JsonBody(_)
            | Error::PathParam(_)
            | Error::QueryParam(_) => "validation_error",
            Error::Unauthenticated(_) => "unauthenticated",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::UpstreamGeneration(_) => "upstream_generation_error",
            _ => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_)
            | Error::InvalidPayload(_)
            | Error::JsonBody(_)
            | Error::PathParam(_)
            | Error::QueryParam(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::UpstreamGeneration(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            Error::Validation(msg)
            | Error::Unauthenticated(msg)
            | Error::Forbidden(msg)
            | Error::NotFound(msg)
            | Error::Conflict(msg)
            | Error::UpstreamGeneration(msg) => msg.clone(),
            Error::InvalidPayload(err) => err.to_string(),
            Error::JsonBody(rejection) => rejection.body_text(),
            Error::PathParam(rejection) => rejection.body_text(),
            Error::QueryParam(rejection) => rejection.body_text(),
            other => {
                tracing::error!(error = %other, "request failed with an internal error");
                "An unexpected error occurred".to_string()
            }
        };

        let body = Json(json!({ "error": self.kind(), "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
