//! Clova Studio chat-completions client.
//!
//! Single HTTP client for both gateway operations. Every attempt first takes
//! a rate-limit slot; HTTP 429 is retried with exponential backoff (3 total
//! attempts, 2 s initial delay, ×2 multiplier, 60 s cap). The remote wraps
//! responses in a status envelope whose success code is the string `"20000"`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::limiter::LlmRateLimiter;
use super::{sanitize_http_error_body, ChatMessage, ChatParams, LlmError, LlmGateway};

/// Default Clova Studio chat-completions endpoint.
pub const DEFAULT_CLOVA_URL: &str =
    "https://clovastudio.stream.ntruss.com/v3/chat-completions/HCX-007";

/// Envelope code signalling success.
const SUCCESS_CODE: &str = "20000";

/// Total attempts per call, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff before the first retry.
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);

/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Clova Studio chat-completions client.
#[derive(Debug, Clone)]
pub struct ClovaClient {
    api_key: String,
    url: String,
    timeout: Duration,
    client: reqwest::Client,
    limiter: Arc<LlmRateLimiter>,
}

impl ClovaClient {
    /// Create a client against the given endpoint.
    ///
    /// The limiter is shared process-wide; pass the same handle to every
    /// client so the budget covers all call sites.
    pub fn new(api_key: impl Into<String>, url: impl Into<String>, limiter: Arc<LlmRateLimiter>) -> Self {
        Self {
            api_key: api_key.into(),
            url: url.into(),
            timeout: REQUEST_TIMEOUT,
            client: reqwest::Client::new(),
            limiter,
        }
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn base_payload(messages: &[ChatMessage], params: ChatParams) -> Value {
        json!({
            "messages": messages,
            "topP": params.top_p,
            "topK": params.top_k,
            "maxCompletionTokens": params.max_completion_tokens,
            "temperature": params.temperature,
            "repetitionPenalty": params.repetition_penalty,
        })
    }

    /// POST the payload, handling rate limiting, 429 retry, and the status
    /// envelope. Returns the inner content string.
    async fn request_content(&self, payload: &Value) -> Result<String, LlmError> {
        let mut attempt = 1u32;
        let mut delay = INITIAL_BACKOFF;

        loop {
            self.limiter.acquire().await;

            let response = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .bearer_auth(&self.api_key)
                .json(payload)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
                warn!(
                    attempt,
                    delay_secs = delay.as_secs(),
                    "chat endpoint rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF);
                attempt += 1;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                return Err(LlmError::HttpStatus {
                    status: status.as_u16(),
                    body: sanitize_http_error_body(&body),
                });
            }

            let envelope: ClovaResponse = serde_json::from_str(&body)
                .map_err(|e| LlmError::Parse(format!("invalid response envelope: {e}")))?;

            if envelope.status.code != SUCCESS_CODE {
                return Err(LlmError::StatusEnvelope {
                    code: envelope.status.code,
                    message: envelope.status.message.unwrap_or_default(),
                });
            }

            let result = envelope
                .result
                .ok_or_else(|| LlmError::Parse("success envelope missing result".to_owned()))?;
            return Ok(result.message.content);
        }
    }
}

#[async_trait]
impl LlmGateway for ClovaClient {
    async fn chat(&self, messages: &[ChatMessage], params: ChatParams) -> Result<String, LlmError> {
        let payload = Self::base_payload(messages, params);
        self.request_content(&payload).await
    }

    async fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: Value,
        params: ChatParams,
    ) -> Result<Value, LlmError> {
        let mut payload = Self::base_payload(messages, params);
        payload["thinking"] = json!({ "effort": "none" });
        payload["responseFormat"] = json!({ "type": "json", "schema": schema });

        let content = self.request_content(&payload).await?;
        serde_json::from_str(&content)
            .map_err(|e| LlmError::Parse(format!("structured content is not valid JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Top-level response envelope.
#[derive(Debug, Deserialize)]
struct ClovaResponse {
    /// Status object carried on every response.
    status: ClovaStatus,
    /// Completion payload; absent on envelope-level errors.
    result: Option<ClovaResult>,
}

/// Status envelope.
#[derive(Debug, Deserialize)]
struct ClovaStatus {
    /// Status code; `"20000"` on success.
    code: String,
    /// Human-readable status message.
    message: Option<String>,
}

/// Completion payload.
#[derive(Debug, Deserialize)]
struct ClovaResult {
    /// The assistant message.
    message: ClovaResultMessage,
}

/// Assistant message inside the completion payload.
#[derive(Debug, Deserialize)]
struct ClovaResultMessage {
    /// Completion text, or a JSON document for structured calls.
    content: String,
}
