//! Lexical (pattern-based) retrieval of similar error examples.
//!
//! A sentence's morphological analysis is standardized into a tag sequence
//! and matched against the full-text index's `normalized_tags` field. Used
//! as a fallback when dense retrieval comes back empty or with low
//! similarity.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{decode_error_words, ErrorExample, RetrievalError};
use crate::morph::standardize::standardize_word;
use crate::morph::Word;

/// Maximum hits requested per query.
const MAX_RESULTS: usize = 5;

/// Request timeout for the full-text index.
const LEXICAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Lexical retrieval interface.
#[async_trait]
pub trait LexicalSearch: Send + Sync {
    /// Retrieve examples whose tag pattern matches the given analysis.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] on transport or parse failure; callers
    /// treat failures as empty results.
    async fn search_by_pattern(&self, words: &[Word]) -> Result<Vec<ErrorExample>, RetrievalError>;
}

/// Elasticsearch-backed lexical retriever.
#[derive(Debug, Clone)]
pub struct EsRetriever {
    host: String,
    index: String,
    client: reqwest::Client,
}

impl EsRetriever {
    /// Create a retriever against the given host and index.
    pub fn new(host: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            index: index.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build the normalized query string from a word-level analysis.
    ///
    /// Per-word emissions are joined with single spaces; words that
    /// standardize to nothing are dropped.
    fn normalized_query(words: &[Word]) -> String {
        words
            .iter()
            .map(standardize_word)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl LexicalSearch for EsRetriever {
    async fn search_by_pattern(&self, words: &[Word]) -> Result<Vec<ErrorExample>, RetrievalError> {
        let normalized = Self::normalized_query(words);
        if normalized.is_empty() {
            warn!("normalized query is empty, skipping pattern search");
            return Ok(Vec::new());
        }

        let url = format!("{}/{}/_search", self.host, self.index);
        let body = json!({
            "query": {
                "match": {
                    "normalized_tags": { "query": normalized }
                }
            },
            "size": MAX_RESULTS,
        });

        let response = self
            .client
            .post(&url)
            .timeout(LEXICAL_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: EsSearchResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        let examples = parsed
            .hits
            .hits
            .into_iter()
            .filter_map(|hit| {
                let source = hit.source;
                let original_sentence = source.original_text?;
                let error_words = decode_error_words(
                    source
                        .metadata
                        .as_ref()
                        .and_then(|metadata| metadata.get("error_words")),
                );
                Some(ErrorExample {
                    original_sentence,
                    error_words,
                })
            })
            .collect();

        Ok(examples)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// `_search` response envelope.
#[derive(Debug, Deserialize)]
struct EsSearchResponse {
    /// Hit container.
    hits: EsHits,
}

/// Hit container.
#[derive(Debug, Deserialize)]
struct EsHits {
    /// Matching documents, best first.
    hits: Vec<EsHit>,
}

/// One matching document.
#[derive(Debug, Deserialize)]
struct EsHit {
    /// The stored document.
    #[serde(rename = "_source")]
    source: EsSource,
}

/// Stored document fields used by retrieval.
#[derive(Debug, Deserialize)]
struct EsSource {
    /// The example's original sentence.
    original_text: Option<String>,
    /// Annotation metadata, including `error_words`.
    metadata: Option<Value>,
}
