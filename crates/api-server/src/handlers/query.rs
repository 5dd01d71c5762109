//! `POST /api/query`. All pipeline logic (cache lookup, readiness gate,
//! analysis, retrieval, context assembly, generation, persistence) lives
//! in [`crate::services::orchestrator::QueryOrchestrator`]; this handler
//! only translates the outcome into an HTTP response.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::models::{QueryRequest, QueryResponse};
use crate::services::orchestrator::AnswerOutcome;
use crate::state::AppState;
use crate::utils::error::ApiError;

pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::BadRequest("question must not be empty".to_string()));
    }

    match state.orchestrator.answer(request).await? {
        AnswerOutcome::Answered(response) => Ok(Json(response)),
        AnswerOutcome::StillProcessing => Err(ApiError::StillProcessing),
    }
}
