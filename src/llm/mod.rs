//! Chat-completion gateway layer.
//!
//! Defines the [`LlmGateway`] trait plus the shared message/parameter/error
//! types, and the typed structured-output helper. The single production
//! implementation is [`clova::ClovaClient`]; services depend only on the
//! trait so tests can substitute scripted doubles.

use async_trait::async_trait;
use regex::Regex;
use schemars::{JsonSchema, SchemaGenerator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod clova;
pub mod limiter;

/// Conversation participant role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instruction.
    System,
    /// Learner-facing request content.
    User,
    /// Model output.
    Assistant,
}

/// A role-tagged message sent to the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one chat call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatParams {
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// Top-k sampling cutoff; 0 disables.
    pub top_k: u32,
    /// Maximum completion tokens.
    pub max_completion_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Repetition penalty.
    pub repetition_penalty: f64,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            top_p: 1.0,
            top_k: 0,
            max_completion_tokens: 1024,
            temperature: 0.1,
            repetition_penalty: 1.0,
        }
    }
}

/// Errors from the chat-completion gateway.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP transport failure or timeout.
    #[error("chat request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status after retries were exhausted or for a
    /// non-retriable status.
    #[error("chat endpoint returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },

    /// The remote's status envelope carried a non-success code.
    #[error("chat status envelope code={code}: {message}")]
    StatusEnvelope {
        /// Envelope status code.
        code: String,
        /// Envelope status message.
        message: String,
    },

    /// Response content could not be parsed.
    #[error("chat response parse error: {0}")]
    Parse(String),

    /// Structured content did not conform to the requested schema.
    #[error("chat structured output schema error: {0}")]
    Schema(String),
}

/// Chat-completion gateway interface.
///
/// Implementations enforce the process-wide rate limit and the 429 retry
/// policy internally; callers see only the final outcome of a call.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Free-form text completion.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, HTTP, or envelope failure.
    async fn chat(&self, messages: &[ChatMessage], params: ChatParams) -> Result<String, LlmError>;

    /// JSON-schema-constrained completion.
    ///
    /// The returned value is the parsed JSON content; callers deserialize it
    /// into their typed output.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] on transport, HTTP, envelope, or parse failure.
    async fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: Value,
        params: ChatParams,
    ) -> Result<Value, LlmError>;
}

/// Run a structured chat call and deserialize the result into `T`.
///
/// The JSON Schema sent to the endpoint is derived from `T`; a response that
/// fails to deserialize is a schema violation.
///
/// # Errors
///
/// Returns [`LlmError::Schema`] when the response does not conform to `T`,
/// or any error of the underlying call.
pub async fn chat_structured_as<T>(
    gateway: &dyn LlmGateway,
    messages: &[ChatMessage],
    params: ChatParams,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = SchemaGenerator::default().into_root_schema_for::<T>();
    let schema =
        serde_json::to_value(&schema).map_err(|e| LlmError::Schema(e.to_string()))?;
    let value = gateway.chat_structured(messages, schema, params).await?;
    serde_json::from_value(value).map_err(|e| LlmError::Schema(e.to_string()))
}

/// Collapse, redact, and truncate an HTTP error body before logging.
pub(crate) fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"Bearer [A-Za-z0-9._\-]{16,}",
        r"nv-[A-Za-z0-9]{16,}",
        r"sk-[A-Za-z0-9]{32,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}
