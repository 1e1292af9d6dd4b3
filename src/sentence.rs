//! Sentence splitting and error-candidate tagging.
//!
//! The body is split into ordered sentences and each one is scored for
//! error-likelihood with cheap morphological heuristics. Only sentences at
//! or above the threshold enter the LLM pipeline; the rest bypass it
//! entirely.

use std::sync::Arc;

use tracing::warn;

use crate::morph::{AnalysisError, MorphAnalyzer};
use crate::types::Sentence;

/// Default candidacy threshold.
pub const DEFAULT_ERROR_THRESHOLD: f64 = 6.0;

/// Noun tags that can head a subject.
const SUBJECT_NOUN_TAGS: &[&str] = &["NP", "NNG"];
/// Particle tags that mark a subject.
const SUBJECT_MARKER_TAGS: &[&str] = &["JKS", "JX"];
/// Predicate (verb/adjective) tags.
const PREDICATE_TAGS: &[&str] = &["VV", "VA"];
/// Foreign-word and symbol tags treated as non-standard content.
const FOREIGN_SYMBOL_TAGS: &[&str] = &["SL", "SW"];

/// Splits compositions into sentences and tags error candidates.
#[derive(Clone)]
pub struct SentenceService {
    analyzer: Arc<dyn MorphAnalyzer>,
    error_threshold: f64,
}

impl SentenceService {
    /// Create a service over the shared analyzer.
    pub fn new(analyzer: Arc<dyn MorphAnalyzer>, error_threshold: f64) -> Self {
        Self {
            analyzer,
            error_threshold,
        }
    }

    /// Split the body into sentences with dense ids starting at 0.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] when the splitter fails; this is the one
    /// failure that aborts the whole request.
    pub async fn split_into_sentences(
        &self,
        contents: &str,
    ) -> Result<Vec<Sentence>, AnalysisError> {
        let split = self.analyzer.split_sentences(contents).await?;

        Ok(split
            .into_iter()
            .enumerate()
            .map(|(idx, text)| {
                let sentence_id = u32::try_from(idx).unwrap_or(u32::MAX);
                Sentence::new(sentence_id, text.trim())
            })
            .collect())
    }

    /// Score every sentence and mark those at or above the threshold.
    pub async fn tag_error_candidates(&self, sentences: &mut [Sentence]) {
        for sentence in sentences.iter_mut() {
            let score = self.error_score(&sentence.original_sentence).await;
            if score >= self.error_threshold {
                sentence.is_error_candidate = true;
            }
        }
    }

    /// Heuristic error-likelihood score.
    ///
    /// A sentence the tagger cannot analyze is always a candidate.
    async fn error_score(&self, sentence: &str) -> f64 {
        let tokens = match self.analyzer.pos(sentence).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, sentence, "morphological analysis failed, promoting to candidate");
                return self.error_threshold + 10.0;
            }
        };

        let mut score: f64 = 0.0;

        // Missing essential constituents: a longer sentence with no
        // predicate, or a predicate with no marked subject.
        let has_predicate = tokens
            .iter()
            .any(|m| PREDICATE_TAGS.contains(&m.tag.as_str()));
        let has_subject = tokens
            .iter()
            .any(|m| SUBJECT_NOUN_TAGS.contains(&m.tag.as_str()))
            && tokens
                .iter()
                .any(|m| SUBJECT_MARKER_TAGS.contains(&m.tag.as_str()));
        if (!has_predicate && tokens.len() > 5) || (has_predicate && !has_subject) {
            score += 4.0;
        }

        // Particle or ending pile-ups suggest a broken structure.
        let particle_count = tokens.iter().filter(|m| m.tag.starts_with('J')).count();
        let ending_count = tokens.iter().filter(|m| m.tag.starts_with('E')).count();
        if particle_count > 3 || ending_count > 3 {
            score += 3.0;
        }

        // Foreign words and stray symbols.
        if tokens
            .iter()
            .any(|m| FOREIGN_SYMBOL_TAGS.contains(&m.tag.as_str()))
        {
            score += 2.0;
        }

        // Length correction.
        let char_count = sentence.chars().count();
        if char_count > 80 {
            score += 1.0;
        } else if char_count < 3 {
            score -= 1.0;
        }

        score.max(0.0)
    }
}
