use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crate::services::orchestrator::QueryFailure;
use rag_core::CoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("llm error: {0}")]
    LlmError(String),

    #[error("documents still processing")]
    StillProcessing,

    /// Query failures surface with a phase, never the raw provider error
    /// body.
    #[error("retrieval failed")]
    RetrievalFailed,

    #[error("generation failed")]
    GenerationFailed,
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => ApiError::BadRequest(msg),
            CoreError::Database(e) => ApiError::DatabaseError(e.to_string()),
            CoreError::Http(e) => ApiError::LlmError(e.to_string()),
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<QueryFailure> for ApiError {
    fn from(err: QueryFailure) -> Self {
        match err {
            QueryFailure::Retrieval(e) => {
                tracing::error!(error = %e, "retrieval phase failed");
                ApiError::RetrievalFailed
            }
            QueryFailure::Generation(e) => {
                tracing::error!(error = %e, "generation phase failed");
                ApiError::GenerationFailed
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => {
                tracing::warn!("not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::DatabaseError(msg) => {
                tracing::error!("database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError", msg)
            }
            ApiError::InternalError(msg) => {
                tracing::error!("internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
            ApiError::LlmError(msg) => {
                tracing::error!("llm error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "LlmError", msg)
            }
            ApiError::StillProcessing => (
                StatusCode::ACCEPTED,
                "StillProcessing",
                "documents for this chat are still being processed".to_string(),
            ),
            ApiError::RetrievalFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "RetrievalFailed",
                "retrieval phase failed".to_string(),
            ),
            ApiError::GenerationFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "GenerationFailed",
                "generation phase failed".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}
