use rag_core::config::LlmConfig;
use rag_core::{CoreError, KeyPool};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Non-streaming LLM client calling an OpenAI-compatible
/// `/v1/chat/completions` endpoint. `external_search_enabled` rides as a
/// single flag on the shared request body rather than a separate
/// provider-specific code path. Credentials are drawn from the Key Pool
/// exactly as [`rag_core::EmbeddingClient`] does.
/// Hard `KeyPool::acquire` deadline for LLM calls (spec §5: "30s for LLM").
const LLM_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct LlmClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_output_tokens: usize,
    key_pool: Arc<KeyPool>,
    max_retries: u32,
}

impl LlmClient {
    pub fn new(config: &LlmConfig, key_pool: Arc<KeyPool>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            max_output_tokens: config.max_output_tokens,
            key_pool,
            max_retries: 3,
        }
    }

    /// `external_search_enabled` must only be set true when chunks-used is
    /// 0 and chat history is empty; this client just forwards the flag,
    /// the orchestrator owns that decision.
    pub async fn generate(
        &self,
        prompt: &str,
        system_instruction: &str,
        external_search_enabled: bool,
        max_output_tokens: Option<usize>,
    ) -> Result<String, CoreError> {
        let max_tokens = max_output_tokens.unwrap_or(self.max_output_tokens);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let lease = self.key_pool.acquire(LLM_ACQUIRE_TIMEOUT).await?;
            let start = Instant::now();

            match self
                .call_provider(prompt, system_instruction, external_search_enabled, max_tokens, &lease.credential)
                .await
            {
                Ok(text) => {
                    self.key_pool.report_success(&lease.key_id).await;
                    debug!(exec_ms = start.elapsed().as_millis() as u64, "llm generate ok");
                    return Ok(text);
                }
                Err(err) => {
                    let credential_invalid = matches!(err, CoreError::CredentialInvalid(_));
                    self.key_pool.report_failure(&lease.key_id, credential_invalid).await;

                    if !err.is_retryable() || attempt >= self.max_retries {
                        warn!(attempt, error = %err, "llm generate failed, giving up");
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "llm generate failed, retrying");
                    tokio::time::sleep(Duration::from_secs(1u64 << (attempt - 1))).await;
                }
            }
        }
    }

    async fn call_provider(
        &self,
        prompt: &str,
        system_instruction: &str,
        external_search_enabled: bool,
        max_tokens: usize,
        credential: &str,
    ) -> Result<String, CoreError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let tools = if external_search_enabled {
            Some(json!([{ "google_search": {} }]))
        } else {
            None
        };

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_instruction.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt.to_string(),
                },
            ],
            max_tokens,
            tools,
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
                "llm provider rejected credential ({status}): {text}"
            )));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CoreError::rate_limited("llm provider rate limited us"));
        }
        if status.is_server_error() {
            return Err(CoreError::transient(format!("llm provider server error: {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::logic(format!("llm provider error ({status}): {text}")));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CoreError::logic(format!("malformed llm response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CoreError::logic("llm provider returned no choices"))
    }
}
