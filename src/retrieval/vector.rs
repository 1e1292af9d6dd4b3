//! Dense vector retrieval of similar error examples.
//!
//! A sentence is embedded by the sentence-encoder sidecar and used to query
//! a Chroma collection for its nearest annotated examples. The top hit's
//! cosine-space similarity (`1 - distance`) drives the lexical fallback
//! decision downstream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_error_words, ErrorExample, RetrievalError};

/// Top-k neighbours requested per query.
const TOP_K: usize = 5;

/// Request timeout for the encoder and the vector store.
const VECTOR_TIMEOUT: Duration = Duration::from_secs(5);

/// Sentence embedding interface.
///
/// The encoder model is fixed at startup and safe for concurrent use.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed the given text into a dense vector.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] if the encoder is unreachable or the
    /// response is malformed.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

/// HTTP sentence-encoder client (`POST {base_url}/embed`).
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpEmbedder {
    /// Create an encoder client for the given model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = format!("{}/embed", self.base_url);
        let body = EmbedRequest {
            model: &self.model,
            input: text,
        };

        let response = self
            .client
            .post(&url)
            .timeout(VECTOR_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Parse("empty embeddings array".to_owned()))
    }
}

/// Result of one vector query.
#[derive(Debug, Clone, Default)]
pub struct VectorHits {
    /// Retrieved examples, nearest first.
    pub examples: Vec<ErrorExample>,
    /// `1 - distance` of the nearest hit, if any hits were returned.
    pub best_similarity: Option<f64>,
}

/// Dense retrieval interface.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Retrieve the nearest error examples for a sentence.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError`] on transport or parse failure; callers
    /// treat failures as empty results.
    async fn search(&self, sentence: &str) -> Result<VectorHits, RetrievalError>;
}

/// Chroma-backed dense retriever.
#[derive(Clone)]
pub struct ChromaRetriever {
    base_url: String,
    collection: String,
    client: reqwest::Client,
    embedder: Arc<dyn Embedder>,
}

impl ChromaRetriever {
    /// Create a retriever against the given host and collection.
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            collection: collection.into(),
            client: reqwest::Client::new(),
            embedder,
        }
    }
}

impl std::fmt::Debug for ChromaRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromaRetriever")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VectorSearch for ChromaRetriever {
    async fn search(&self, sentence: &str) -> Result<VectorHits, RetrievalError> {
        let embedding = self.embedder.embed(sentence).await?;

        let url = format!(
            "{}/api/v1/collections/{}/query",
            self.base_url, self.collection
        );
        let body = ChromaQueryRequest {
            query_embeddings: vec![embedding],
            n_results: TOP_K,
            include: &["documents", "metadatas", "distances"],
        };

        let response = self
            .client
            .post(&url)
            .timeout(VECTOR_TIMEOUT)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChromaQueryResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::Parse(e.to_string()))?;

        let documents = parsed
            .documents
            .and_then(|mut rows| (!rows.is_empty()).then(|| rows.remove(0)))
            .unwrap_or_default();
        let metadatas = parsed
            .metadatas
            .and_then(|mut rows| (!rows.is_empty()).then(|| rows.remove(0)))
            .unwrap_or_default();
        let distances = parsed
            .distances
            .and_then(|mut rows| (!rows.is_empty()).then(|| rows.remove(0)))
            .unwrap_or_default();

        let best_similarity = distances.first().map(|d| 1.0 - d);

        let examples = documents
            .into_iter()
            .zip(metadatas.into_iter().chain(std::iter::repeat(Value::Null)))
            .map(|(document, metadata)| ErrorExample {
                original_sentence: document,
                error_words: decode_error_words(metadata.get("error_words")),
            })
            .collect();

        Ok(VectorHits {
            examples,
            best_similarity,
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Request body for the encoder sidecar.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    /// Encoder model name.
    model: &'a str,
    /// Text to embed.
    input: &'a str,
}

/// Response body from the encoder sidecar.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    /// One embedding per input.
    embeddings: Vec<Vec<f32>>,
}

/// Chroma collection query request.
#[derive(Debug, Serialize)]
struct ChromaQueryRequest<'a> {
    /// Query embeddings (one per query).
    query_embeddings: Vec<Vec<f32>>,
    /// Neighbours requested.
    n_results: usize,
    /// Payload sections to include.
    include: &'a [&'a str],
}

/// Chroma collection query response. Rows are per-query; we send one query.
#[derive(Debug, Deserialize)]
struct ChromaQueryResponse {
    /// Documents per query.
    documents: Option<Vec<Vec<String>>>,
    /// Metadata objects per query.
    metadatas: Option<Vec<Vec<Value>>>,
    /// Distances per query, nearest first.
    distances: Option<Vec<Vec<f64>>>,
}
