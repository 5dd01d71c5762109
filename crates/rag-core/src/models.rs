use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Processing tier of a [`Document`].
///
/// Advances monotonically PENDING -> EXTRACTING -> CHUNKED -> EMBEDDING ->
/// COMPLETED, except that FAILED is reachable (and terminal) from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentTier {
    Pending,
    Extracting,
    Chunked,
    Embedding,
    Completed,
    Failed,
}

impl DocumentTier {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentTier::Failed | DocumentTier::Completed)
    }

    /// A document in this tier is not yet embedded and not failed, i.e. the
    /// "documents are still processing" readiness gate applies.
    pub fn is_still_processing(self) -> bool {
        matches!(
            self,
            DocumentTier::Pending | DocumentTier::Extracting | DocumentTier::Chunked
        )
    }
}

impl std::fmt::Display for DocumentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentTier::Pending => "PENDING",
            DocumentTier::Extracting => "EXTRACTING",
            DocumentTier::Chunked => "CHUNKED",
            DocumentTier::Embedding => "EMBEDDING",
            DocumentTier::Completed => "COMPLETED",
            DocumentTier::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub chat_id: uuid::Uuid,
    pub display_name: String,
    pub byte_size: i64,
    pub file_type: String,
    pub tier: DocumentTier,
    pub total_chunks: i32,
    pub chunks_embedded: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One retrievable unit of text, denormalizing `user_id`/`chat_id` from its
/// parent document for index-friendly filtering.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Chunk {
    pub id: uuid::Uuid,
    pub document_id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub chat_id: uuid::Uuid,
    pub chunk_index: i32,
    pub content: String,
    pub content_hash: String,
    pub page_number: Option<i32>,
    pub slide_number: Option<i32>,
    pub section_title: Option<String>,
    pub token_count: i32,
    #[sqlx(default)]
    pub embedding: Option<pgvector::Vector>,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn content_hash_of(content: &str) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn approx_token_count(content: &str) -> i32 {
        ((content.len() as f64) / 4.0).ceil() as i32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: uuid::Uuid,
    pub document_id: uuid::Uuid,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A source citation attached to an answer, persisted alongside each query
/// history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: uuid::Uuid,
    pub file_name: String,
    pub page: Option<i32>,
    pub slide: Option<i32>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub chat_id: uuid::Uuid,
    pub question: String,
    #[sqlx(default)]
    pub question_embedding: Option<pgvector::Vector>,
    pub answer: String,
    #[sqlx(json)]
    pub sources: serde_json::Value,
    pub retrieval_ms: i64,
    pub generation_ms: i64,
    pub total_ms: i64,
    pub chunks_retrieved: i32,
    pub llm_calls_used: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: uuid::Uuid,
    pub user_id: uuid::Uuid,
    pub chat_id: uuid::Uuid,
    pub query_text: String,
    pub query_hash: String,
    #[sqlx(default)]
    pub query_embedding: Option<pgvector::Vector>,
    pub response_text: String,
    #[sqlx(json)]
    pub sources: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hit_count: i32,
}

/// Normalizes a question for cache matching: lowercase plus
/// whitespace-collapse, then SHA-256 of the result.
pub fn normalize_and_hash_question(question: &str) -> (String, String) {
    let normalized = question
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let hash = hex::encode(hasher.finalize());
    (normalized, hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyUsageRecord {
    pub key_id: String,
    pub requests_this_minute: u32,
    pub tokens_this_minute: u64,
    pub daily_requests: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_processing_gate() {
        assert!(DocumentTier::Pending.is_still_processing());
        assert!(DocumentTier::Extracting.is_still_processing());
        assert!(DocumentTier::Chunked.is_still_processing());
        assert!(!DocumentTier::Embedding.is_still_processing());
        assert!(!DocumentTier::Completed.is_still_processing());
        assert!(!DocumentTier::Failed.is_still_processing());
    }

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        let (a_norm, a_hash) = normalize_and_hash_question("What   IS   Rust?");
        let (b_norm, b_hash) = normalize_and_hash_question("what is rust?");
        assert_eq!(a_norm, b_norm);
        assert_eq!(a_hash, b_hash);
    }

    #[test]
    fn approx_token_count_matches_spec_formula() {
        assert_eq!(Chunk::approx_token_count("abcd"), 1);
        assert_eq!(Chunk::approx_token_count("abcde"), 2);
        assert_eq!(Chunk::approx_token_count(""), 0);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = Chunk::content_hash_of("hello world");
        let b = Chunk::content_hash_of("hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
