use thiserror::Error;

/// Domain error taxonomy shared by both binaries: a typed domain enum plus
/// `From` conversions from the crates it wraps, mirrored by each binary's
/// own `ApiError`/`WorkerError` at the HTTP/worker boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("credential invalid: {0}")]
    CredentialInvalid(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("logic error: {0}")]
    Logic(String),

    #[error("infrastructure error: {0}")]
    InfraFatal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("no key available: {0}")]
    NoKeyAvailable(String),

    #[error("all keys unhealthy: {0}")]
    AllKeysUnhealthy(String),
}

impl CoreError {
    /// Whether a caller should retry this operation against a different key
    /// or after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Transient(_) | CoreError::RateLimited(_) | CoreError::Http(_)
        )
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        CoreError::Transient(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        CoreError::RateLimited(msg.into())
    }

    pub fn credential_invalid(msg: impl Into<String>) -> Self {
        CoreError::CredentialInvalid(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        CoreError::Logic(msg.into())
    }

    pub fn infra_fatal(msg: impl Into<String>) -> Self {
        CoreError::InfraFatal(msg.into())
    }

    pub fn no_key_available(msg: impl Into<String>) -> Self {
        CoreError::NoKeyAvailable(msg.into())
    }

    pub fn all_keys_unhealthy(msg: impl Into<String>) -> Self {
        CoreError::AllKeysUnhealthy(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CoreError::transient("x").is_retryable());
        assert!(CoreError::rate_limited("x").is_retryable());
        assert!(!CoreError::credential_invalid("x").is_retryable());
        assert!(!CoreError::validation("x").is_retryable());
        assert!(!CoreError::logic("x").is_retryable());
        assert!(!CoreError::infra_fatal("x").is_retryable());
    }
}
