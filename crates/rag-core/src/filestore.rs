use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// File storage abstraction: `get`/`put` with retry, shared by the upload
/// path (`put`, in `api-server`) and the ingestion pipeline (`get`, in
/// `ingestion-worker`). A trait so a network-backed object store can stand
/// in for the local filesystem without touching either binary's pipeline
/// code.
#[async_trait::async_trait]
pub trait FileStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>>;
    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()>;
}

/// `get`'s retry count, tuned to the upload-then-read race: the upload
/// layer's `put` may not have landed on a shared filesystem yet by the
/// time a job is leased.
const GET_MAX_ATTEMPTS: u32 = 5;

pub struct LocalFileStore {
    root: PathBuf,
    max_retries: u32,
}

impl LocalFileStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            max_retries: 3,
        }
    }

    pub fn resolve(&self, key: &str) -> PathBuf {
        let path = Path::new(key);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

#[async_trait::async_trait]
impl FileStore for LocalFileStore {
    async fn get(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        let path = self.resolve(key);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match tokio::fs::read(&path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < GET_MAX_ATTEMPTS => {
                    warn!(?path, attempt, error = %e, "file read failed, retrying");
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.resolve(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match tokio::fs::write(&path, bytes).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    warn!(?path, attempt, error = %e, "file write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
