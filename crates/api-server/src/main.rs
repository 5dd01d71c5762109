use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{error, info};

use api_server::config::Settings;
use api_server::handlers;
use api_server::llm_client::LlmClient;
use api_server::services::{QueryCache, QueryOrchestrator};
use api_server::state::AppState;
use api_server::utils::Limiters;
use rag_core::{ChunkStore, DbPool, DocumentStore, EmbeddingClient, HybridRetriever, JobQueue, KeyPool, LocalFileStore};

#[tokio::main]
async fn main() -> Result<()> {
    api_server::utils::logger::init_logger()?;

    info!("starting api server");

    let settings = Settings::load()?;
    info!("configuration loaded");

    let db_pool = DbPool::new(&settings.database).await?;
    db_pool.migrate().await?;
    info!("database connection established");

    let key_pool = Arc::new(KeyPool::new(&settings.key_pool));
    let embedding_acquire_timeout = key_pool.default_timeout();
    let embedding_client = Arc::new(EmbeddingClient::new(
        &settings.embedding,
        key_pool.clone(),
        embedding_acquire_timeout,
    ));
    let llm_client = Arc::new(LlmClient::new(&settings.llm, key_pool.clone()));

    let document_store = Arc::new(DocumentStore::new(db_pool.clone()));
    let job_queue = Arc::new(JobQueue::new(db_pool.clone()));
    let chunk_store = ChunkStore::new(db_pool.clone());
    let retriever = Arc::new(HybridRetriever::new(chunk_store, settings.retrieval.clone()));
    let cache = Arc::new(QueryCache::new(
        db_pool.clone(),
        settings.cache.ttl_seconds,
        settings.cache.semantic_threshold,
    ));
    let file_store: Arc<dyn rag_core::FileStore> =
        Arc::new(LocalFileStore::new(settings.ingestion.document_root_path.clone()));

    let orchestrator = Arc::new(QueryOrchestrator::new(
        db_pool.clone(),
        document_store.clone(),
        embedding_client.clone(),
        retriever.clone(),
        llm_client.clone(),
        cache.clone(),
        settings.map_reduce.clone(),
        settings.llm.max_output_tokens,
        settings.retrieval.max_chunks,
    ));

    let limiters = Arc::new(Limiters::new(8, settings.map_reduce.max_parallel_map, Duration::from_secs(30)));

    let eviction_cache = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match eviction_cache.evict_expired().await {
                Ok(count) if count > 0 => info!(count, "evicted expired cache entries"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "failed to evict expired cache entries"),
            }
        }
    });

    let max_upload_bytes = settings.server.max_upload_bytes;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    let state = Arc::new(AppState {
        settings: Arc::new(settings),
        db_pool: db_pool.clone(),
        document_store,
        job_queue,
        file_store,
        key_pool,
        embedding_client,
        retriever,
        llm_client,
        orchestrator,
        cache,
        limiters,
    });

    let app = build_router(state, max_upload_bytes);

    let addr = SocketAddr::from((host.parse::<std::net::IpAddr>()?, port));
    info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/api/documents", post(handlers::upload::upload_handler))
        .route("/api/chats/{chat_id}/documents", get(handlers::documents::list_documents_handler))
        .route("/api/query", post(handlers::query::query_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default().include_headers(true)))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
