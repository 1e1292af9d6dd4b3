//! Request-level feedback orchestration.
//!
//! One facade call fans out the context task and one grammar task per
//! candidate sentence, joins them with per-task error isolation, assembles
//! the response in input order, and schedules best-effort event publication
//! that the request never waits for.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use crate::events::{CollectEventPublisher, GrammarFeedbackEvent};
use crate::morph::AnalysisError;
use crate::sentence::SentenceService;
use crate::types::{
    ContextFeedback, FeedbackRequest, FeedbackResponse, GrammarFeedback, Sentence,
};

pub mod context;
pub mod grammar;

pub use context::ContextService;
pub use grammar::GrammarService;

/// Stub substituted when the context task fails.
pub const CONTEXT_FAILURE_STUB: &str = "문맥 피드백 생성에 실패했습니다.";

/// Orchestrates one feedback request end to end.
#[derive(Clone)]
pub struct FeedbackFacade {
    context_service: ContextService,
    grammar_service: Arc<GrammarService>,
    sentence_service: SentenceService,
    publisher: Arc<CollectEventPublisher>,
}

impl FeedbackFacade {
    /// Create a facade over the shared services.
    pub fn new(
        context_service: ContextService,
        grammar_service: Arc<GrammarService>,
        sentence_service: SentenceService,
        publisher: Arc<CollectEventPublisher>,
    ) -> Self {
        Self {
            context_service,
            grammar_service,
            sentence_service,
            publisher,
        }
    }

    /// Run the full pipeline for one request.
    ///
    /// Individual task failures never fail the request; the only fatal
    /// error is the sentence splitter itself.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError`] when sentence splitting fails.
    pub async fn create_feedback(
        &self,
        request: FeedbackRequest,
        user_id: &str,
    ) -> Result<FeedbackResponse, AnalysisError> {
        // 1. Context feedback runs concurrently with everything below.
        let context_service = self.context_service.clone();
        let title = request.title.clone();
        let contents = request.contents.clone();
        let context_task = tokio::spawn(async move {
            context_service
                .create_context_feedback(&title, &contents)
                .await
        });

        // 2. Split and tag; splitting is the one fatal step.
        let mut sentences = self
            .sentence_service
            .split_into_sentences(&request.contents)
            .await?;
        self.sentence_service
            .tag_error_candidates(&mut sentences)
            .await;

        let candidate_count = sentences.iter().filter(|s| s.is_error_candidate).count();
        info!(
            total = sentences.len(),
            candidates = candidate_count,
            "sentences split and tagged"
        );

        // 3. One grammar task per candidate.
        let mut grammar_tasks = Vec::new();
        for sentence in sentences.iter().filter(|s| s.is_error_candidate) {
            let service = Arc::clone(&self.grammar_service);
            let candidate = sentence.clone();
            let sentence_id = sentence.sentence_id;
            grammar_tasks.push((
                sentence_id,
                tokio::spawn(async move { service.attach_grammar_feedback(candidate).await }),
            ));
        }

        // 4. Join everything; each slot is inspected independently so one
        // failure cannot cancel or poison the others.
        let context_feedback = match context_task.await {
            Ok(Ok(feedback)) => feedback,
            Ok(Err(e)) => {
                error!(error = %e, "context feedback task failed");
                ContextFeedback {
                    feedback: CONTEXT_FAILURE_STUB.to_owned(),
                }
            }
            Err(e) => {
                error!(error = %e, "context feedback task aborted");
                ContextFeedback {
                    feedback: CONTEXT_FAILURE_STUB.to_owned(),
                }
            }
        };

        for (sentence_id, task) in grammar_tasks {
            let feedback: Option<GrammarFeedback> = match task.await {
                Ok(Ok(feedback)) => Some(feedback),
                Ok(Err(e)) => {
                    error!(sentence_id, error = %e, "grammar feedback task failed");
                    None
                }
                Err(e) => {
                    error!(sentence_id, error = %e, "grammar feedback task aborted");
                    None
                }
            };
            if let Some(feedback) = feedback {
                if let Some(sentence) = sentences
                    .iter_mut()
                    .find(|s| s.sentence_id == sentence_id)
                {
                    sentence.grammar_feedback = Some(feedback);
                }
            }
        }

        // 5. Assembly: expose feedback only when it actually corrects
        // something. Non-candidates, clean verdicts, and failures all
        // collapse to the same "no feedback" shape.
        for sentence in &mut sentences {
            let has_feedback = sentence
                .grammar_feedback
                .as_ref()
                .is_some_and(|feedback| !feedback.feedbacks.is_empty());
            sentence.is_error = has_feedback;
            if !has_feedback {
                sentence.grammar_feedback = None;
            }
        }

        // 6. Fire-and-forget event publication; never awaited by the
        // request, failures logged by the watcher task.
        let events: Vec<GrammarFeedbackEvent> = sentences
            .iter()
            .filter_map(|sentence| {
                sentence
                    .grammar_feedback
                    .as_ref()
                    .map(|feedback| build_grammar_event(sentence, feedback, user_id))
            })
            .collect();
        if !events.is_empty() {
            let publisher = Arc::clone(&self.publisher);
            let publish_task =
                tokio::spawn(async move { publisher.publish_safe(&events).await });
            tokio::spawn(async move {
                if let Err(e) = publish_task.await {
                    error!(error = %e, "event publication task aborted");
                }
            });
        }

        Ok(FeedbackResponse {
            context_feedback,
            sentences,
        })
    }
}

/// Build the collection event for one corrected sentence.
fn build_grammar_event(
    sentence: &Sentence,
    feedback: &GrammarFeedback,
    user_id: &str,
) -> GrammarFeedbackEvent {
    GrammarFeedbackEvent {
        user_id: user_id.to_owned(),
        timestamp: Utc::now().to_rfc3339(),
        sentence_id: sentence.sentence_id,
        original_text: sentence.original_sentence.clone(),
        corrected_text: feedback.corrected_sentence.clone(),
        feedbacks: feedback.feedbacks.clone(),
    }
}
