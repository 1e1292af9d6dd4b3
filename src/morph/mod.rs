//! Morphological analysis interface and the HTTP tagger bridge.
//!
//! The tagger itself is an external collaborator (a mecab-ko sidecar); this
//! module only defines the [`MorphAnalyzer`] seam the pipeline depends on,
//! plus the word-level grouping used by lexical retrieval. The tag set is
//! treated as opaque strings; categorisation lives in [`categories`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod categories;
pub mod standardize;

/// One morpheme with its part-of-speech tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Morpheme {
    /// Surface form of the morpheme.
    pub surface: String,
    /// Part-of-speech tag as emitted by the tagger (e.g. `NNG`, `JKO`).
    pub tag: String,
}

/// An eojeol (space-delimited word) as a group of morphemes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Word {
    /// Morphemes of the word, in surface order.
    pub morphs: Vec<Morpheme>,
}

/// Errors from morphological analysis.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// HTTP transport failure reaching the tagger.
    #[error("tagger request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Response did not match the expected format.
    #[error("tagger response parse error: {0}")]
    Parse(String),
}

/// Morphological analyzer interface.
///
/// Implementations must be `Send + Sync`; the analyzer is a process-wide
/// singleton shared across request tasks.
#[async_trait]
pub trait MorphAnalyzer: Send + Sync {
    /// Tag the given text, returning morphemes in surface order.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the tagger is unreachable or responds
    /// with an unexpected payload.
    async fn pos(&self, text: &str) -> Result<Vec<Morpheme>, AnalysisError>;

    /// Split a body of text into sentences, morphology-aware.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] if the tagger is unreachable or responds
    /// with an unexpected payload.
    async fn split_sentences(&self, text: &str) -> Result<Vec<String>, AnalysisError>;
}

/// Group a sentence into eojeol-level morpheme lists.
///
/// Produces the same `words` structure the lexical index was built from:
/// the sentence is split on whitespace and each eojeol is tagged separately.
///
/// # Errors
///
/// Returns [`AnalysisError`] if tagging any eojeol fails.
pub async fn analyze_sentence_to_words(
    analyzer: &dyn MorphAnalyzer,
    sentence: &str,
) -> Result<Vec<Word>, AnalysisError> {
    let mut words = Vec::new();
    for eojeol in sentence.split_whitespace() {
        let morphs = analyzer.pos(eojeol).await?;
        words.push(Word { morphs });
    }
    Ok(words)
}

/// Default request timeout for the tagger sidecar.
const TAGGER_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP bridge to a mecab-ko tagging sidecar.
///
/// Calls `POST {base_url}/pos` for tagging and `POST {base_url}/sentences`
/// for sentence splitting.
#[derive(Debug, Clone)]
pub struct MecabTagger {
    base_url: String,
    client: reqwest::Client,
}

impl MecabTagger {
    /// Create a tagger bridge against the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MorphAnalyzer for MecabTagger {
    async fn pos(&self, text: &str) -> Result<Vec<Morpheme>, AnalysisError> {
        let url = format!("{}/pos", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(TAGGER_TIMEOUT)
            .json(&TaggerRequest { text })
            .send()
            .await?
            .error_for_status()?;

        let parsed: PosResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        Ok(parsed.morphemes)
    }

    async fn split_sentences(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        let url = format!("{}/sentences", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(TAGGER_TIMEOUT)
            .json(&TaggerRequest { text })
            .send()
            .await?
            .error_for_status()?;

        let parsed: SentencesResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        Ok(parsed.sentences)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Request body for both tagger endpoints.
#[derive(Debug, Serialize)]
struct TaggerRequest<'a> {
    /// Text to analyze.
    text: &'a str,
}

/// Response body from `/pos`.
#[derive(Debug, Deserialize)]
struct PosResponse {
    /// Tagged morphemes in surface order.
    morphemes: Vec<Morpheme>,
}

/// Response body from `/sentences`.
#[derive(Debug, Deserialize)]
struct SentencesResponse {
    /// Split sentences in text order.
    sentences: Vec<String>,
}
