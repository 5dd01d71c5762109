use crate::config::EmbeddingConfig;
use crate::error::CoreError;
use crate::keypool::KeyPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequestBody {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embedding client, calling an OpenAI-compatible `/v1/embeddings`
/// endpoint, drawing credentials from the Key Pool and classifying
/// provider failures instead of holding a single static API key.
pub struct EmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    pub dimension: usize,
    batch_size: usize,
    key_pool: Arc<KeyPool>,
    max_retries: u32,
    acquire_timeout: Duration,
}

impl EmbeddingClient {
    /// `acquire_timeout` is the hard `KeyPool::acquire` deadline for this
    /// client's calls (spec §5: 30s for interactive/LLM-adjacent callers,
    /// 5 minutes for the background embedding sweeper).
    pub fn new(config: &EmbeddingConfig, key_pool: Arc<KeyPool>, acquire_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size,
            key_pool,
            max_retries: 3,
            acquire_timeout,
        }
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, CoreError> {
        let mut result = self.embed_batch(&[text.to_string()]).await?;
        result
            .pop()
            .ok_or_else(|| CoreError::logic("embedding provider returned empty batch"))
    }

    /// Embeds up to `batch_size` texts per provider call, chunking larger
    /// inputs and preserving input order in the returned vector.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size.max(1)) {
            let embeddings = self.embed_chunk_with_retry(chunk).await?;
            out.extend(embeddings);
        }
        Ok(out)
    }

    async fn embed_chunk_with_retry(&self, chunk: &[String]) -> Result<Vec<Vec<f32>>, CoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let lease = self.key_pool.acquire(self.acquire_timeout).await?;
            let start = Instant::now();

            match self.call_provider(chunk, &lease.credential).await {
                Ok(embeddings) => {
                    self.key_pool.report_success(&lease.key_id).await;
                    debug!(exec_ms = start.elapsed().as_millis() as u64, "embedding batch ok");
                    return Ok(embeddings);
                }
                Err(err) => {
                    let credential_invalid = matches!(err, CoreError::CredentialInvalid(_));
                    self.key_pool
                        .report_failure(&lease.key_id, credential_invalid)
                        .await;

                    if !err.is_retryable() || attempt >= self.max_retries {
                        warn!(attempt, error = %err, "embedding call failed, giving up");
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "embedding call failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1u64 << (attempt - 1))).await;
                }
            }
        }
    }

    async fn call_provider(
        &self,
        chunk: &[String],
        credential: &str,
    ) -> Result<Vec<Vec<f32>>, CoreError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = EmbeddingRequestBody {
            input: chunk.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", credential))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::transient(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::credential_invalid(format!(
                "embedding provider rejected credential ({status}): {text}"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::rate_limited("embedding provider rate limited us"));
        }
        if status.is_server_error() {
            return Err(CoreError::transient(format!(
                "embedding provider server error: {status}"
            )));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::logic(format!(
                "embedding provider error ({status}): {text}"
            )));
        }

        let parsed: EmbeddingResponseBody = response
            .json()
            .await
            .map_err(|e| CoreError::logic(format!("malformed embedding response: {e}")))?;

        if parsed.data.len() != chunk.len() {
            return Err(CoreError::logic(format!(
                "embedding provider returned {} vectors for {} inputs",
                parsed.data.len(),
                chunk.len()
            )));
        }

        for datum in &parsed.data {
            if datum.embedding.len() != self.dimension {
                return Err(CoreError::logic(format!(
                    "embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    datum.embedding.len()
                )));
            }
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
