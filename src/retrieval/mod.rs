//! Error-example retrieval backends.
//!
//! Two stores hold annotated learner sentences: a dense vector collection
//! ([`vector`]) and a lexical full-text index ([`lexical`]). Both return
//! [`ErrorExample`] values used purely as few-shot context for the first
//! correction call. Retrieval failures are never fatal; callers treat them
//! as empty results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub mod lexical;
pub mod vector;

/// One annotated wrong expression inside a retrieved example.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorWord {
    /// `"wrong -> right"` rendering or a short annotation.
    pub text: String,
    /// Where in the sentence the error sits.
    #[serde(default)]
    pub error_location: Option<String>,
    /// What kind of error it is.
    #[serde(default)]
    pub error_aspect: Option<String>,
    /// Proficiency level the error is typical of.
    #[serde(default)]
    pub error_level: Option<String>,
}

/// A retrieved learner sentence with its annotated errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExample {
    /// The original (erroneous) sentence.
    pub original_sentence: String,
    /// Annotated wrong expressions, in sentence order.
    pub error_words: Vec<ErrorWord>,
}

/// Errors from either retrieval backend.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// HTTP transport failure.
    #[error("retrieval request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response did not match the expected format.
    #[error("retrieval response parse error: {0}")]
    Parse(String),
}

/// Decode the `error_words` metadata field.
///
/// The stores hold it either as a JSON-encoded string or as a native list;
/// anything else, and any malformed entry inside the list, is skipped.
pub fn decode_error_words(raw: Option<&Value>) -> Vec<ErrorWord> {
    let items: Vec<Value> = match raw {
        Some(Value::String(encoded)) => match serde_json::from_str(encoded) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "error_words metadata is not valid JSON, skipping");
                Vec::new()
            }
        },
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}
