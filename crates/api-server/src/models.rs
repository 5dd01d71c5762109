use chrono::{DateTime, Utc};
use rag_core::models::SourceRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub display_name: String,
    pub tier: String,
}

/// Request body for `POST /api/query`.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub question: String,
    #[serde(default)]
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub cross_chat: bool,
    #[serde(default)]
    pub chat_history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub chunks_used: usize,
    pub llm_calls_used: u32,
    pub mode: String,
    pub cache_hit: bool,
    pub timings: QueryTimings,
}

#[derive(Debug, Serialize)]
pub struct QueryTimings {
    pub retrieval_ms: i64,
    pub generation_ms: i64,
    pub total_ms: i64,
}

#[derive(Debug, Serialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub display_name: String,
    pub tier: String,
    pub total_chunks: i32,
    pub chunks_embedded: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
