//! `POST /api/documents`. Accepts already-authenticated `user_id`/
//! `chat_id` fields alongside the file (auth/session is handled upstream),
//! persists the `documents` row at tier PENDING, durably stores the
//! bytes, and enqueues a processing job.

use axum::extract::{Multipart, State};
use axum::Json;
use rag_core::JobPriority;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::UploadResponse;
use crate::state::AppState;
use crate::utils::error::ApiError;

struct ParsedUpload {
    user_id: Uuid,
    chat_id: Uuid,
    filename: String,
    bytes: Vec<u8>,
}

async fn parse_multipart(mut multipart: Multipart) -> Result<ParsedUpload, ApiError> {
    let mut user_id: Option<Uuid> = None;
    let mut chat_id: Option<Uuid> = None;
    let mut filename: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or("").to_string().as_str() {
            "user_id" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                user_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::BadRequest("user_id must be a uuid".to_string()))?,
                );
            }
            "chat_id" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                chat_id = Some(
                    text.parse()
                        .map_err(|_| ApiError::BadRequest("chat_id must be a uuid".to_string()))?,
                );
            }
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("failed to read file: {e}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    Ok(ParsedUpload {
        user_id: user_id.ok_or_else(|| ApiError::BadRequest("missing user_id".to_string()))?,
        chat_id: chat_id.ok_or_else(|| ApiError::BadRequest("missing chat_id".to_string()))?,
        filename: filename.ok_or_else(|| ApiError::BadRequest("missing file".to_string()))?,
        bytes: bytes.ok_or_else(|| ApiError::BadRequest("missing file".to_string()))?,
    })
}

/// Coarse file-type tag derived from the filename's guessed MIME type,
/// matching the `mime_guess::from_path` idiom `ingestion-worker`'s
/// `document/loader.rs` uses to dispatch extraction.
fn file_type_tag(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let upload = parse_multipart(multipart).await?;
    if upload.bytes.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
    }

    let file_type = file_type_tag(&upload.filename);

    let document = state
        .document_store
        .create(
            upload.user_id,
            upload.chat_id,
            &upload.filename,
            upload.bytes.len() as i64,
            &file_type,
        )
        .await?;

    // Key format must match what `ingestion-worker`'s dispatch loop reads
    // the bytes back under (`{chat_id}/{document_id}`).
    let key = format!("{}/{}", document.chat_id, document.id);
    state
        .file_store
        .put(&key, &upload.bytes)
        .await
        .map_err(|e| ApiError::InternalError(format!("failed to store uploaded file: {e}")))?;

    let job_id = state
        .job_queue
        .enqueue(document.id, JobPriority::Normal, state.settings.ingestion.max_attempts)
        .await?;

    info!(document_id = %document.id, %job_id, "document uploaded and job enqueued");

    Ok(Json(UploadResponse {
        document_id: document.id,
        display_name: document.display_name,
        tier: document.tier.to_string(),
    }))
}
