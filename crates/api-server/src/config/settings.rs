use anyhow::Result;
use config::{Config, Environment, File};
use rag_core::config::{
    CacheConfig, DatabaseConfig, EmbeddingConfig, IngestionConfig, KeyPoolConfig, LlmConfig,
    MapReduceConfig, RetrievalConfig,
};
use serde::{Deserialize, Serialize};

/// Top-level settings for the query-answering binary. Shared sub-configs
/// (database, embedding, key pool, retrieval, cache, LLM, map-reduce) live
/// in `rag_core::config` since `ingestion-worker` needs the database/
/// embedding/key-pool shapes too.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub key_pool: KeyPoolConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    pub map_reduce: MapReduceConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.key_pool.keys.is_empty() {
            anyhow::bail!("at least one embedding provider key must be configured");
        }
        if self.map_reduce.map_batch_token_limit >= self.map_reduce.single_call_token_limit {
            anyhow::bail!("map batch token limit must be smaller than the single-call limit");
        }
        Ok(())
    }
}
