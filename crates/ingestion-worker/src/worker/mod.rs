pub mod processor;
pub mod sweeper;

pub use processor::DocumentProcessor;
pub use sweeper::EmbeddingSweeper;

use crate::config::settings::Settings;
use anyhow::Result;
use rag_core::{
    ChunkStore, DbPool, DocumentStore, EmbeddingClient, FileStore, JobQueue, KeyPool,
    LocalFileStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Ingestion worker pool: a fixed number of concurrent lease loops pulling
/// work from the durable [`JobQueue`] instead of LISTEN/NOTIFY plus an
/// in-memory task queue.
pub struct IngestionWorkerPool {
    settings: Settings,
    db_pool: DbPool,
    job_queue: Arc<JobQueue>,
    document_store: Arc<DocumentStore>,
    processor: Arc<DocumentProcessor>,
    file_root: PathBuf,
}

impl IngestionWorkerPool {
    pub async fn new(settings: Settings, db_pool: DbPool) -> Result<Self> {
        let document_store = Arc::new(DocumentStore::new(db_pool.clone()));
        let chunk_store = Arc::new(ChunkStore::new(db_pool.clone()));
        let job_queue = Arc::new(JobQueue::new(db_pool.clone()));

        let processor = Arc::new(DocumentProcessor::new(
            &settings,
            document_store.clone(),
            chunk_store,
        ));

        Ok(Self {
            file_root: settings.ingestion.document_root_path.clone(),
            settings,
            db_pool,
            job_queue,
            document_store,
            processor,
        })
    }

    /// Spawns `worker_pool_size` lease loops, the embedding sweeper, and
    /// the stale-lease release sweep, running until `ctrl_c`.
    pub async fn run(self, key_pool: Arc<KeyPool>) -> Result<()> {
        let worker_id_prefix = format!("ingestion-{}", std::process::id());
        let pool_size = self.settings.ingestion.worker_pool_size;
        info!(pool_size, "starting ingestion worker pool");

        let file_store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(self.file_root.clone()));
        let lease_seconds = self.settings.ingestion.lease_seconds;

        let mut handles = Vec::with_capacity(pool_size);
        for n in 0..pool_size {
            let worker_id = format!("{worker_id_prefix}-{n}");
            let job_queue = self.job_queue.clone();
            let document_store = self.document_store.clone();
            let processor = self.processor.clone();
            let file_store = file_store.clone();

            handles.push(tokio::spawn(async move {
                lease_loop(worker_id, job_queue, document_store, processor, file_store, lease_seconds).await;
            }));
        }

        // Spec §5: background embedding gets a 5-minute `acquire` deadline,
        // well past the LLM-facing 30s default, since the sweeper has no
        // request latency budget to protect.
        let embedding_client = Arc::new(EmbeddingClient::new(
            &self.settings.embedding,
            key_pool,
            std::time::Duration::from_secs(300),
        ));
        let sweeper = EmbeddingSweeper::new(
            self.settings.sweeper.clone(),
            ChunkStore::new(self.db_pool.clone()),
            self.document_store.clone(),
            embedding_client,
        );
        let sweeper_handle = tokio::spawn(async move { sweeper.run().await });

        let stale_release_job_queue = self.job_queue.clone();
        let stale_release_interval = std::cmp::max(lease_seconds / 2, 1) as u64;
        let stale_release_handle = tokio::spawn(async move {
            release_stale_loop(stale_release_job_queue, stale_release_interval).await;
        });

        tokio::signal::ctrl_c().await?;
        info!("shutdown signal received, stopping ingestion worker pool");
        for handle in handles {
            handle.abort();
        }
        sweeper_handle.abort();
        stale_release_handle.abort();
        Ok(())
    }
}

/// Background sweep releasing jobs whose lease expired without being
/// renewed or completed, so a worker that died mid-job doesn't strand it
/// in PROCESSING forever. Runs at least every `lease_seconds / 2`.
async fn release_stale_loop(job_queue: Arc<JobQueue>, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));
    loop {
        interval.tick().await;
        match job_queue.release_stale().await {
            Ok(count) if count > 0 => info!(count, "released stale job leases"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "failed to release stale job leases"),
        }
    }
}

async fn lease_loop(
    worker_id: String,
    job_queue: Arc<JobQueue>,
    document_store: Arc<DocumentStore>,
    processor: Arc<DocumentProcessor>,
    file_store: Arc<dyn FileStore>,
    lease_seconds: i64,
) {
    loop {
        let job = match job_queue.lease_next(&worker_id, lease_seconds).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
                continue;
            }
            Err(e) => {
                error!(worker_id, error = %e, "lease_next failed");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
                continue;
            }
        };

        let document = match document_store.get(job.document_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                warn!(document_id = %job.document_id, "leased job for missing document");
                let _ = job_queue.fail(job.id, "document not found").await;
                continue;
            }
            Err(e) => {
                error!(document_id = %job.document_id, error = %e, "failed to load document");
                let _ = job_queue.fail(job.id, &e.to_string()).await;
                continue;
            }
        };

        let key = format!("{}/{}", document.chat_id, document.id);
        let bytes = match file_store.get(&key).await {
            Ok(b) => b,
            Err(e) => {
                error!(document_id = %job.document_id, error = %e, "failed to fetch source file");
                let _ = job_queue.fail(job.id, &e.to_string()).await;
                continue;
            }
        };

        let tmp_path = std::env::temp_dir().join(format!("{}-{}", job.id, document.display_name));
        if let Err(e) = tokio::fs::write(&tmp_path, &bytes).await {
            error!(document_id = %job.document_id, error = %e, "failed to stage source file");
            let _ = job_queue.fail(job.id, &e.to_string()).await;
            continue;
        }

        match processor.process_document(job.document_id, &tmp_path).await {
            Ok(()) => {
                let _ = job_queue.complete(job.id).await;
            }
            Err(e) => {
                error!(document_id = %job.document_id, error = %e, "document processing failed");
                let _ = document_store.mark_failed(job.document_id, &e.to_string()).await;
                let _ = job_queue.fail(job.id, &e.to_string()).await;
            }
        }

        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
}

