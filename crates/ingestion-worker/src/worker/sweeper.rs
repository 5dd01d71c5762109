use pgvector::Vector;
use rag_core::config::SweeperConfig;
use rag_core::models::DocumentTier;
use rag_core::{ChunkStore, DocumentStore, EmbeddingClient};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Embedding backfill sweeper. A recurring tick loop that finds documents
/// in the EMBEDDING tier, pulls their not-yet-embedded chunks in batches,
/// embeds them, and advances the document toward COMPLETED. A re-entrancy
/// guard keeps overlapping ticks from ever running concurrently.
pub struct EmbeddingSweeper {
    config: SweeperConfig,
    chunk_store: ChunkStore,
    document_store: Arc<DocumentStore>,
    embedding_client: Arc<EmbeddingClient>,
    running: AtomicBool,
}

impl EmbeddingSweeper {
    pub fn new(
        config: SweeperConfig,
        chunk_store: ChunkStore,
        document_store: Arc<DocumentStore>,
        embedding_client: Arc<EmbeddingClient>,
    ) -> Self {
        Self {
            config,
            chunk_store,
            document_store,
            embedding_client,
            running: AtomicBool::new(false),
        }
    }

    pub async fn run(self) {
        info!(interval_ms = self.config.interval_ms, "embedding sweeper started");
        let mut interval = tokio::time::interval(tokio::time::Duration::from_millis(self.config.interval_ms));

        loop {
            interval.tick().await;

            if self.running.swap(true, Ordering::SeqCst) {
                debug!("sweeper tick skipped: previous tick still running");
                continue;
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "sweeper tick failed");
            }

            self.running.store(false, Ordering::SeqCst);
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        let documents = self
            .document_store
            .list_embedding_candidates(self.config.max_chunks_per_run)
            .await?;

        for document in documents {
            let pending = self
                .chunk_store
                .find_pending_embeddings(document.id, self.config.max_chunks_per_run)
                .await?;

            if pending.is_empty() {
                let remaining = self.chunk_store.count_pending_embeddings(document.id).await?;
                if remaining == 0 {
                    self.document_store
                        .set_tier(document.id, DocumentTier::Completed)
                        .await?;
                    info!(document_id = %document.id, "document fully embedded");
                }
                continue;
            }

            let texts: Vec<String> = pending.iter().map(|c| c.content.clone()).collect();
            let embeddings = match self.embedding_client.embed_batch(&texts).await {
                Ok(e) => e,
                Err(e) => {
                    warn!(document_id = %document.id, error = %e, "embedding batch failed, will retry next tick");
                    continue;
                }
            };

            let mut embedded_count = 0i32;
            for (chunk, embedding) in pending.iter().zip(embeddings.into_iter()) {
                match self
                    .chunk_store
                    .update_embedding(chunk.id, Vector::from(embedding))
                    .await
                {
                    Ok(()) => embedded_count += 1,
                    Err(e) => warn!(chunk_id = %chunk.id, error = %e, "failed to persist embedding"),
                }
            }

            if embedded_count > 0 {
                self.document_store
                    .increment_chunks_embedded(document.id, embedded_count)
                    .await?;
                debug!(document_id = %document.id, embedded_count, "sweeper progress");
            }
        }

        Ok(())
    }
}
