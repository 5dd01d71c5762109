use serde::{Deserialize, Serialize};

/// Shared sub-config structs, embedded into each binary's top-level
/// `Settings` so `api-server` and `ingestion-worker` share one
/// `DatabaseConfig`/`EmbeddingConfig`/etc. shape.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KeyPoolConfig {
    pub keys: Vec<ProviderKeyConfig>,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    #[serde(default = "default_consecutive_failure_threshold")]
    pub consecutive_failure_threshold: u32,
    /// Fallback `acquire` timeout for callers that don't pass their own
    /// (spec's "30s for LLM" default); the background sweeper overrides
    /// this with its own 5-minute timeout when it calls `acquire` directly.
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderKeyConfig {
    pub id: String,
    pub credential: String,
    pub rpm: u32,
}

fn default_cooldown_seconds() -> u64 {
    120
}

fn default_consecutive_failure_threshold() -> u32 {
    3
}

fn default_acquire_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_dimension() -> usize {
    768
}

fn default_batch_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_output_tokens() -> usize {
    8192
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    #[serde(default = "default_target_chunks")]
    pub target_chunks: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
    #[serde(default)]
    pub max_chunks_per_document: Option<usize>,
    #[serde(default = "default_max_chunks_per_section")]
    pub max_chunks_per_section: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

fn default_max_chunks() -> usize {
    100
}
fn default_target_chunks() -> usize {
    30
}
fn default_rrf_k() -> u32 {
    60
}
fn default_max_chunks_per_section() -> usize {
    3
}
fn default_min_score() -> f32 {
    0.1
}

impl RetrievalConfig {
    pub fn max_chunks_per_document(&self) -> usize {
        self.max_chunks_per_document
            .unwrap_or_else(|| (self.max_chunks / 4).max(5))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: i64,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
}

fn default_cache_ttl() -> i64 {
    86_400
}
fn default_semantic_threshold() -> f32 {
    0.95
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: i64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_document_root")]
    pub document_root_path: std::path::PathBuf,
}

fn default_document_root() -> std::path::PathBuf {
    std::path::PathBuf::from("./documents")
}

fn default_worker_pool_size() -> usize {
    10
}
fn default_lease_seconds() -> i64 {
    300
}
fn default_max_attempts() -> i32 {
    3
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SweeperConfig {
    #[serde(default = "default_sweeper_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_chunks_per_run")]
    pub max_chunks_per_run: i64,
}

fn default_sweeper_interval_ms() -> u64 {
    5000
}
fn default_max_chunks_per_run() -> i64 {
    500
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MapReduceConfig {
    #[serde(default = "default_single_call_token_limit")]
    pub single_call_token_limit: usize,
    #[serde(default = "default_map_batch_token_limit")]
    pub map_batch_token_limit: usize,
    #[serde(default = "default_max_parallel_map")]
    pub max_parallel_map: usize,
    #[serde(default = "default_max_reduce_iterations")]
    pub max_reduce_iterations: usize,
}

fn default_single_call_token_limit() -> usize {
    100_000
}
fn default_map_batch_token_limit() -> usize {
    25_000
}
fn default_max_parallel_map() -> usize {
    5
}
fn default_max_reduce_iterations() -> usize {
    3
}

impl Default for MapReduceConfig {
    fn default() -> Self {
        Self {
            single_call_token_limit: default_single_call_token_limit(),
            map_batch_token_limit: default_map_batch_token_limit(),
            max_parallel_map: default_max_parallel_map(),
            max_reduce_iterations: default_max_reduce_iterations(),
        }
    }
}
