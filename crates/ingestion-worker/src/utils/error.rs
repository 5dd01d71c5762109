use rag_core::CoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("document not found: {0}")]
    DocumentNotFound(Uuid),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("file too large: {0} MB (max: {1} MB)")]
    FileTooLarge(u64, u64),

    #[error("parsing error: {0}")]
    ParsingError(String),

    #[error("chunking error: {0}")]
    ChunkingError(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for WorkerError {
    fn from(err: anyhow::Error) -> Self {
        WorkerError::Unknown(err.to_string())
    }
}
