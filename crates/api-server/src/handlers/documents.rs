//! `GET /api/chats/{chat_id}/documents` — read-only status surface so an
//! upload client can poll a document's tier (PENDING/EXTRACTING/CHUNKED/
//! EMBEDDING/COMPLETED/FAILED) without reaching into storage directly.

use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::DocumentSummary;
use crate::state::AppState;
use crate::utils::error::ApiError;

pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    let docs = state.document_store.list_by_chat(chat_id).await?;

    Ok(Json(
        docs.into_iter()
            .map(|d| DocumentSummary {
                id: d.id,
                display_name: d.display_name,
                tier: d.tier.to_string(),
                total_chunks: d.total_chunks,
                chunks_embedded: d.chunks_embedded,
                created_at: d.created_at,
                completed_at: d.completed_at,
            })
            .collect(),
    ))
}
