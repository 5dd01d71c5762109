use crate::config::settings::{ChunkingConfig, Settings};
use crate::document::{DocumentLoader, DocumentParser, TextChunker};
use crate::utils::error::WorkerError;
use rag_core::models::{Chunk as ChunkModel, DocumentTier};
use rag_core::{ChunkStore, DocumentStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pipeline for a single document: load -> parse -> chunk -> persist.
/// Deliberately stops after chunking — embedding generation is deferred to
/// the backfill sweeper so a temporarily-unavailable embedding provider
/// never blocks extraction.
pub struct DocumentProcessor {
    chunking: ChunkingConfig,
    document_store: Arc<DocumentStore>,
    chunk_store: Arc<ChunkStore>,
}

impl DocumentProcessor {
    pub fn new(
        settings: &Settings,
        document_store: Arc<DocumentStore>,
        chunk_store: Arc<ChunkStore>,
    ) -> Self {
        Self {
            chunking: settings.chunking.clone(),
            document_store,
            chunk_store,
        }
    }

    pub async fn process_document(
        &self,
        document_id: Uuid,
        file_path: &Path,
    ) -> Result<(), WorkerError> {
        info!(%document_id, "processing document");

        let document = self
            .document_store
            .get(document_id)
            .await?
            .ok_or(WorkerError::DocumentNotFound(document_id))?;

        DocumentLoader::validate_file(file_path, 100)
            .map_err(|e| WorkerError::FileNotFound(e.to_string()))?;

        self.document_store
            .set_tier(document_id, DocumentTier::Extracting)
            .await?;

        let parsed = DocumentParser::parse(file_path)
            .map_err(|e| WorkerError::ParsingError(e.to_string()))?;

        if parsed.is_empty() {
            warn!(%document_id, "document has no extractable text");
            self.document_store.set_total_chunks(document_id, 0).await?;
            self.document_store
                .set_tier(document_id, DocumentTier::Completed)
                .await?;
            return Ok(());
        }

        let chunker = TextChunker::new(
            self.chunking.size,
            self.chunking.overlap,
            self.chunking.strategy.clone(),
        );
        let chunks = chunker
            .chunk_pages(&parsed.pages)
            .map_err(|e| WorkerError::ChunkingError(e.to_string()))?;

        if chunks.is_empty() {
            warn!(%document_id, "document produced no chunks");
            self.document_store.set_total_chunks(document_id, 0).await?;
            self.document_store
                .set_tier(document_id, DocumentTier::Completed)
                .await?;
            return Ok(());
        }

        debug!(%document_id, count = chunks.len(), "chunked document");

        self.chunk_store
            .delete_by_document(document_id)
            .await?;

        let models: Vec<ChunkModel> = chunks
            .into_iter()
            .map(|c| ChunkModel {
                id: Uuid::new_v4(),
                document_id,
                user_id: document.user_id,
                chat_id: document.chat_id,
                chunk_index: c.index as i32,
                content_hash: ChunkModel::content_hash_of(&c.content),
                token_count: ChunkModel::approx_token_count(&c.content),
                content: c.content,
                page_number: c.page_number,
                slide_number: c.slide_number,
                section_title: c.section_title,
                embedding: None,
                created_at: chrono::Utc::now(),
            })
            .collect();

        let total = models.len() as i32;
        self.chunk_store.insert_chunks_batch(&models).await?;
        self.document_store
            .set_total_chunks(document_id, total)
            .await?;
        self.document_store
            .set_tier(document_id, DocumentTier::Chunked)
            .await?;
        self.document_store
            .set_tier(document_id, DocumentTier::Embedding)
            .await?;

        info!(%document_id, chunks = total, "document ready for embedding backfill");
        Ok(())
    }
}

pub fn resolve_file_path(root: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        root.join(path)
    }
}
