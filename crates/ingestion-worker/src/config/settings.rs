use anyhow::Result;
use config::{Config, Environment, File};
use rag_core::config::{DatabaseConfig, EmbeddingConfig, IngestionConfig, KeyPoolConfig, SweeperConfig};
use serde::{Deserialize, Serialize};

/// Worker-specific chunking config (`ChunkingConfig`/`ChunkStrategy`);
/// shared sub-configs (database, embedding, key pool, sweeper, ingestion)
/// live in `rag_core::config` since `api-server` needs the same
/// database/key-pool/embedding shapes.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub embedding: EmbeddingConfig,
    pub key_pool: KeyPoolConfig,
    pub chunking: ChunkingConfig,
    pub ingestion: IngestionConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChunkingConfig {
    pub size: usize,
    pub overlap: usize,
    #[serde(default = "default_strategy")]
    pub strategy: ChunkStrategy,
}

fn default_strategy() -> ChunkStrategy {
    ChunkStrategy::PagePerChunk
}

/// `PagePerChunk` is the documented default: one chunk per non-empty page
/// or slide, full page text, no sub-splitting. `Semantic`/`Fixed`/
/// `Recursive` are opt-in alternatives for documents whose pages are too
/// large for a single chunk to embed and retrieve well.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    PagePerChunk,
    Semantic,
    Fixed,
    Recursive,
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
        if self.chunking.overlap >= self.chunking.size {
            anyhow::bail!("chunk overlap must be smaller than chunk size");
        }
        Ok(())
    }
}
