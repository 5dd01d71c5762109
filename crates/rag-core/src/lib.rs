pub mod config;
pub mod db;
pub mod documents;
pub mod embedding_client;
pub mod error;
pub mod filestore;
pub mod jobqueue;
pub mod keypool;
pub mod models;
pub mod retriever;
pub mod store;

pub use db::DbPool;
pub use documents::DocumentStore;
pub use embedding_client::EmbeddingClient;
pub use error::{CoreError, CoreResult};
pub use filestore::{FileStore, LocalFileStore};
pub use jobqueue::{JobPriority, JobQueue};
pub use keypool::{KeyPool, Lease};
pub use retriever::{HybridRetriever, RetrievedChunk};
pub use store::{ChunkStore, ScoredChunk};
