use anyhow::Result;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Concurrency caps for outbound calls the orchestrator makes — a pure
/// concurrency limiter, distinct from the Key Pool's per-key rate limiting.
#[derive(Clone)]
pub struct Limiters {
    pub embedding: Arc<Semaphore>,
    pub llm_generate: Arc<Semaphore>,
    pub acquire_timeout: Duration,
}

impl Limiters {
    pub fn new(embedding_concurrency: usize, llm_generate_concurrency: usize, acquire_timeout: Duration) -> Self {
        Self {
            embedding: Arc::new(Semaphore::new(embedding_concurrency.max(1))),
            llm_generate: Arc::new(Semaphore::new(llm_generate_concurrency.max(1))),
            acquire_timeout,
        }
    }

    pub async fn acquire_timed(
        sem: Arc<Semaphore>,
        acquire_timeout: Duration,
        op: &'static str,
    ) -> Result<(OwnedSemaphorePermit, Duration)> {
        let start = Instant::now();

        let permit = tokio::time::timeout(acquire_timeout, sem.acquire_owned())
            .await
            .map_err(|_| anyhow::anyhow!("limiter acquire timeout for op={}", op))??;

        Ok((permit, start.elapsed()))
    }
}
