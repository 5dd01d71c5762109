use std::sync::Arc;

use rag_core::{DbPool, DocumentStore, EmbeddingClient, FileStore, HybridRetriever, JobQueue, KeyPool};

use crate::config::Settings;
use crate::llm_client::LlmClient;
use crate::services::{QueryCache, QueryOrchestrator};
use crate::utils::Limiters;

/// Shared state handed to every handler via axum's `State` extractor: the
/// collaborators the thin HTTP surface over document upload and query
/// answering needs, and nothing more.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db_pool: DbPool,
    pub document_store: Arc<DocumentStore>,
    pub job_queue: Arc<JobQueue>,
    pub file_store: Arc<dyn FileStore>,
    pub key_pool: Arc<KeyPool>,
    pub embedding_client: Arc<EmbeddingClient>,
    pub retriever: Arc<HybridRetriever>,
    pub llm_client: Arc<LlmClient>,
    pub orchestrator: Arc<QueryOrchestrator>,
    pub cache: Arc<QueryCache>,
    pub limiters: Arc<Limiters>,
}
