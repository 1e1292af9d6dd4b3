//! Request, response, and pipeline schema types.
//!
//! These mirror the JSON surface of the feedback API. Fields that exist only
//! for the internal pipeline (candidate tagging, cached morphological
//! analysis) are excluded from serialization.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::morph::Word;

/// A learner composition submitted for feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRequest {
    /// Title of the composition.
    pub title: String,
    /// Body text of the composition.
    pub contents: String,
}

/// One sentence of the composition, in splitter order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    /// Dense index of the sentence within the request, starting at 0.
    pub sentence_id: u32,
    /// The sentence text as produced by the splitter, trimmed.
    pub original_sentence: String,
    /// Whether the morphological heuristic flagged this sentence for the
    /// grammar pipeline. Internal only.
    #[serde(skip)]
    pub is_error_candidate: bool,
    /// Whether the pipeline produced at least one correction for this
    /// sentence. Set during response assembly.
    #[serde(default)]
    pub is_error: bool,
    /// Grammar feedback, present iff `is_error` is true.
    pub grammar_feedback: Option<GrammarFeedback>,
    /// Cached word-level morphological analysis. Internal only.
    #[serde(skip)]
    pub words: Option<Vec<Word>>,
}

impl Sentence {
    /// Build a fresh sentence with no feedback attached.
    pub fn new(sentence_id: u32, original_sentence: impl Into<String>) -> Self {
        Self {
            sentence_id,
            original_sentence: original_sentence.into(),
            is_error_candidate: false,
            is_error: false,
            grammar_feedback: None,
            words: None,
        }
    }
}

/// Structured verdict of the first-stage correction call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CorrectionOutput {
    /// Whether the model judged the sentence to contain a genuine error.
    pub is_error: bool,
    /// The corrected sentence; equals the input when `is_error` is false.
    pub corrected_sentence: String,
    /// Grammatical-element tokens changed by the correction (particles,
    /// endings). Empty when `is_error` is false.
    pub errors: Vec<String>,
}

/// One explained correction inside a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackDetail {
    /// `"wrong -> right"` rendering of the change.
    pub corrects: String,
    /// Plain-language explanation of why the change is needed.
    pub reason: String,
}

/// Second-stage output: the corrected sentence plus per-change explanations.
///
/// An empty `feedbacks` list means no correction was applied; the response
/// assembly collapses such values to "no feedback".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GrammarFeedback {
    /// The fully corrected sentence.
    pub corrected_sentence: String,
    /// One entry per explained change, possibly empty.
    pub feedbacks: Vec<FeedbackDetail>,
}

impl GrammarFeedback {
    /// Feedback that leaves the sentence untouched.
    pub fn unchanged(original_sentence: impl Into<String>) -> Self {
        Self {
            corrected_sentence: original_sentence.into(),
            feedbacks: Vec::new(),
        }
    }
}

/// Holistic feedback on the composition as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFeedback {
    /// A short paragraph (3–5 sentences) of context feedback.
    pub feedback: String,
}

/// The full feedback response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    /// Holistic feedback on the whole composition.
    pub context_feedback: ContextFeedback,
    /// All sentences of the composition, in input order.
    pub sentences: Vec<Sentence>,
}
