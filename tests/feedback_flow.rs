//! End-to-end tests of the feedback orchestration pipeline over scripted
//! collaborators: the fan-out, the fallback policy, per-task error
//! isolation, response assembly, and event publication.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use gyojeong::dictionary::{GrammarDbInfo, GrammarDictionary};
use gyojeong::events::{CollectEventPublisher, EventBus, FallbackSink, GrammarFeedbackEvent, PublishError};
use gyojeong::feedback::{ContextService, FeedbackFacade, GrammarService, CONTEXT_FAILURE_STUB};
use gyojeong::llm::{ChatMessage, ChatParams, LlmError, LlmGateway};
use gyojeong::morph::{AnalysisError, Morpheme, MorphAnalyzer};
use gyojeong::retrieval::lexical::LexicalSearch;
use gyojeong::retrieval::vector::{VectorHits, VectorSearch};
use gyojeong::retrieval::{ErrorExample, ErrorWord, RetrievalError};
use gyojeong::sentence::SentenceService;
use gyojeong::types::{FeedbackDetail, FeedbackRequest};

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// Gateway scripted per sentence; records every call for spying.
#[derive(Default)]
struct ScriptedGateway {
    /// Context response; `None` fails the context call.
    context_response: Option<String>,
    /// First-stage output per sentence.
    corrections: HashMap<String, Value>,
    /// Second-stage output per sentence.
    feedbacks: HashMap<String, Value>,
    /// Sentences whose first-stage call fails.
    fail_correction_for: HashSet<String>,
    chat_calls: AtomicUsize,
    correction_calls: Mutex<Vec<String>>,
    feedback_calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    fn with_context(mut self, text: &str) -> Self {
        self.context_response = Some(text.to_owned());
        self
    }

    fn with_correction(mut self, sentence: &str, output: Value) -> Self {
        self.corrections.insert(sentence.to_owned(), output);
        self
    }

    fn with_feedback(mut self, sentence: &str, output: Value) -> Self {
        self.feedbacks.insert(sentence.to_owned(), output);
        self
    }

    fn failing_correction_for(mut self, sentence: &str) -> Self {
        self.fail_correction_for.insert(sentence.to_owned());
        self
    }

    fn correction_call_count(&self) -> usize {
        self.correction_calls.lock().expect("lock").len()
    }

    fn feedback_call_count(&self) -> usize {
        self.feedback_calls.lock().expect("lock").len()
    }

    fn correction_calls(&self) -> Vec<String> {
        self.correction_calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn chat(&self, _messages: &[ChatMessage], _params: ChatParams) -> Result<String, LlmError> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.context_response
            .clone()
            .ok_or_else(|| LlmError::Parse("scripted context failure".to_owned()))
    }

    async fn chat_structured(
        &self,
        messages: &[ChatMessage],
        schema: Value,
        _params: ChatParams,
    ) -> Result<Value, LlmError> {
        let user_content = messages
            .last()
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let is_correction = schema.to_string().contains("is_error");

        if is_correction {
            self.correction_calls
                .lock()
                .expect("lock")
                .push(user_content.clone());
            for (sentence, output) in &self.corrections {
                if user_content.contains(sentence) {
                    if self.fail_correction_for.contains(sentence) {
                        return Err(LlmError::Parse("scripted correction failure".to_owned()));
                    }
                    return Ok(output.clone());
                }
            }
        } else {
            self.feedback_calls
                .lock()
                .expect("lock")
                .push(user_content.clone());
            for (sentence, output) in &self.feedbacks {
                if user_content.contains(sentence) {
                    return Ok(output.clone());
                }
            }
        }

        Err(LlmError::Parse("unscripted structured call".to_owned()))
    }
}

/// Vector retriever scripted per sentence; unknown sentences yield no hits.
#[derive(Default)]
struct ScriptedVector {
    hits: HashMap<String, VectorHits>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedVector {
    fn with_hits(mut self, sentence: &str, examples: Vec<ErrorExample>, best: f64) -> Self {
        self.hits.insert(
            sentence.to_owned(),
            VectorHits {
                examples,
                best_similarity: Some(best),
            },
        );
        self
    }
}

#[async_trait]
impl VectorSearch for ScriptedVector {
    async fn search(&self, sentence: &str) -> Result<VectorHits, RetrievalError> {
        self.calls.lock().expect("lock").push(sentence.to_owned());
        Ok(self.hits.get(sentence).cloned().unwrap_or_default())
    }
}

/// Lexical retriever returning a fixed example list; counts invocations.
#[derive(Default)]
struct ScriptedLexical {
    examples: Vec<ErrorExample>,
    calls: AtomicUsize,
}

#[async_trait]
impl LexicalSearch for ScriptedLexical {
    async fn search_by_pattern(
        &self,
        _words: &[gyojeong::morph::Word],
    ) -> Result<Vec<ErrorExample>, RetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.examples.clone())
    }
}

/// Dictionary returning fixed entries; records queried element lists.
#[derive(Default)]
struct ScriptedDictionary {
    infos: Vec<GrammarDbInfo>,
    queries: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl GrammarDictionary for ScriptedDictionary {
    async fn lookup(&self, elements: &[String]) -> Vec<GrammarDbInfo> {
        self.queries.lock().expect("lock").push(elements.to_vec());
        self.infos.clone()
    }
}

/// Analyzer scripted per input; unscripted `pos` inputs fail, which promotes
/// full sentences to candidates while still allowing eojeol-level analysis.
#[derive(Default)]
struct ScriptedAnalyzer {
    sentences: Vec<String>,
    pos: HashMap<String, Vec<Morpheme>>,
}

impl ScriptedAnalyzer {
    fn splitting_into(sentences: &[&str]) -> Self {
        Self {
            sentences: sentences.iter().map(|s| (*s).to_owned()).collect(),
            pos: HashMap::new(),
        }
    }

    fn with_pos(mut self, text: &str, morphs: &[(&str, &str)]) -> Self {
        self.pos.insert(
            text.to_owned(),
            morphs
                .iter()
                .map(|(surface, tag)| Morpheme {
                    surface: (*surface).to_owned(),
                    tag: (*tag).to_owned(),
                })
                .collect(),
        );
        self
    }

    /// Script a token set that scores below the candidacy threshold.
    fn with_clean_pos(self, text: &str) -> Self {
        self.with_pos(
            text,
            &[
                ("나", "NP"),
                ("는", "JX"),
                ("밥", "NNG"),
                ("을", "JKO"),
                ("먹", "VV"),
                ("었", "EP"),
                ("다", "EF"),
            ],
        )
    }
}

#[async_trait]
impl MorphAnalyzer for ScriptedAnalyzer {
    async fn pos(&self, text: &str) -> Result<Vec<Morpheme>, AnalysisError> {
        self.pos
            .get(text)
            .cloned()
            .ok_or_else(|| AnalysisError::Parse("unscripted input".to_owned()))
    }

    async fn split_sentences(&self, _text: &str) -> Result<Vec<String>, AnalysisError> {
        Ok(self.sentences.clone())
    }
}

/// In-memory bus recording every published record.
#[derive(Default)]
struct RecordingBus {
    records: Mutex<Vec<(String, String)>>,
    flushes: AtomicUsize,
}

impl RecordingBus {
    fn records(&self) -> Vec<(String, String)> {
        self.records.lock().expect("lock").clone()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn send(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        self.records
            .lock()
            .expect("lock")
            .push((topic.to_owned(), payload.to_owned()));
        Ok(())
    }

    async fn flush(&self) -> Result<(), PublishError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Bus that rejects every send.
struct FailingBus;

#[async_trait]
impl EventBus for FailingBus {
    async fn send(&self, _topic: &str, _payload: &str) -> Result<(), PublishError> {
        Err(PublishError::Bus("scripted outage".to_owned()))
    }

    async fn flush(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Fallback sink recording saved batches.
#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<GrammarFeedbackEvent>>>,
}

#[async_trait]
impl FallbackSink for RecordingSink {
    async fn save(&self, events: &[GrammarFeedbackEvent]) -> Result<(), PublishError> {
        self.batches.lock().expect("lock").push(events.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    facade: FeedbackFacade,
    gateway: Arc<ScriptedGateway>,
    lexical: Arc<ScriptedLexical>,
    dictionary: Arc<ScriptedDictionary>,
    bus: Arc<RecordingBus>,
}

fn harness(
    gateway: ScriptedGateway,
    vector: ScriptedVector,
    lexical: ScriptedLexical,
    dictionary: ScriptedDictionary,
    analyzer: ScriptedAnalyzer,
) -> Harness {
    let gateway = Arc::new(gateway);
    let lexical = Arc::new(lexical);
    let dictionary = Arc::new(dictionary);
    let analyzer = Arc::new(analyzer);
    let bus = Arc::new(RecordingBus::default());

    let publisher = Arc::new(CollectEventPublisher::new(
        Arc::clone(&bus) as Arc<dyn EventBus>,
        "grammar-feedback",
        None,
    ));
    let context_service =
        ContextService::new(Arc::clone(&gateway) as Arc<dyn LlmGateway>);
    let grammar_service = Arc::new(GrammarService::new(
        Arc::clone(&gateway) as Arc<dyn LlmGateway>,
        Arc::new(vector) as Arc<dyn VectorSearch>,
        Arc::clone(&lexical) as Arc<dyn LexicalSearch>,
        Arc::clone(&dictionary) as Arc<dyn GrammarDictionary>,
        Arc::clone(&analyzer) as Arc<dyn MorphAnalyzer>,
        0.60,
    ));
    let sentence_service =
        SentenceService::new(Arc::clone(&analyzer) as Arc<dyn MorphAnalyzer>, 6.0);

    let facade = FeedbackFacade::new(context_service, grammar_service, sentence_service, publisher);

    Harness {
        facade,
        gateway,
        lexical,
        dictionary,
        bus,
    }
}

fn example(sentence: &str) -> ErrorExample {
    ErrorExample {
        original_sentence: sentence.to_owned(),
        error_words: vec![ErrorWord {
            text: "은 -> 을".to_owned(),
            error_location: None,
            error_aspect: None,
            error_level: None,
        }],
    }
}

fn request(contents: &str) -> FeedbackRequest {
    FeedbackRequest {
        title: "하루".to_owned(),
        contents: contents.to_owned(),
    }
}

/// Wait for the fire-and-forget publication task to run.
async fn published_records(bus: &RecordingBus) -> Vec<(String, String)> {
    for _ in 0..100 {
        let records = bus.records();
        if !records.is_empty() {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bus.records()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

const S1_SENTENCE: &str = "나는 비빔밥은 먹었다.";
const S1_CORRECTED: &str = "나는 비빔밥을 먹었다.";

fn s1_gateway() -> ScriptedGateway {
    ScriptedGateway::default()
        .with_context("제목과 내용이 잘 어울리는 글입니다.")
        .with_correction(
            S1_SENTENCE,
            json!({
                "is_error": true,
                "corrected_sentence": S1_CORRECTED,
                "errors": ["을"],
            }),
        )
        .with_feedback(
            S1_SENTENCE,
            json!({
                "corrected_sentence": S1_CORRECTED,
                "feedbacks": [{
                    "corrects": "비빔밥은 -> 비빔밥을",
                    "reason": "목적어에는 목적격 조사 '을'을 씁니다.",
                }],
            }),
        )
}

#[tokio::test]
async fn happy_path_corrects_one_sentence_and_publishes_one_event() {
    let vector = ScriptedVector::default().with_hits(
        S1_SENTENCE,
        vec![example("예문 하나"), example("예문 둘"), example("예문 셋")],
        0.72,
    );
    let dictionary = ScriptedDictionary {
        infos: vec![GrammarDbInfo {
            grammar_element: "을".to_owned(),
            explanation: "의미: 목적격 조사".to_owned(),
        }],
        queries: Mutex::new(Vec::new()),
    };
    let harness = harness(
        s1_gateway(),
        vector,
        ScriptedLexical::default(),
        dictionary,
        ScriptedAnalyzer::splitting_into(&[S1_SENTENCE]),
    );

    let response = harness
        .facade
        .create_feedback(request(S1_SENTENCE), "session-1")
        .await
        .expect("pipeline");

    assert_eq!(response.sentences.len(), 1);
    let sentence = &response.sentences[0];
    assert_eq!(sentence.sentence_id, 0);
    assert!(sentence.is_error);
    let feedback = sentence.grammar_feedback.as_ref().expect("feedback");
    assert_eq!(feedback.corrected_sentence, S1_CORRECTED);
    assert_eq!(feedback.feedbacks.len(), 1);

    // High similarity: the lexical fallback must not fire.
    assert_eq!(harness.lexical.calls.load(Ordering::SeqCst), 0);

    // The dictionary saw exactly the corrected elements.
    assert_eq!(
        harness.dictionary.queries.lock().expect("lock").as_slice(),
        &[vec!["을".to_owned()]]
    );

    // Exactly one event, flat camelCase record.
    let records = published_records(&harness.bus).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].0, "grammar-feedback");
    let record: Value = serde_json::from_str(&records[0].1).expect("record json");
    assert_eq!(record["userId"], "session-1");
    assert_eq!(record["sentenceId"], 0);
    assert_eq!(record["originalText"], S1_SENTENCE);
    assert_eq!(record["correctedText"], S1_CORRECTED);
    assert_eq!(record["feedbacks"].as_array().expect("array").len(), 1);
    assert!(record["timestamp"].is_string());
}

#[tokio::test]
async fn clean_verdict_yields_no_feedback_no_event_no_second_call() {
    let gateway = ScriptedGateway::default()
        .with_context("잘 썼습니다.")
        .with_correction(
            S1_SENTENCE,
            json!({
                "is_error": false,
                "corrected_sentence": S1_SENTENCE,
                "errors": [],
            }),
        );
    let vector = ScriptedVector::default().with_hits(
        S1_SENTENCE,
        vec![example("예문 하나")],
        0.72,
    );
    let harness = harness(
        gateway,
        vector,
        ScriptedLexical::default(),
        ScriptedDictionary::default(),
        ScriptedAnalyzer::splitting_into(&[S1_SENTENCE]),
    );

    let response = harness
        .facade
        .create_feedback(request(S1_SENTENCE), "session-2")
        .await
        .expect("pipeline");

    let sentence = &response.sentences[0];
    assert!(!sentence.is_error);
    assert!(sentence.grammar_feedback.is_none());

    assert_eq!(harness.gateway.correction_call_count(), 1);
    assert_eq!(harness.gateway.feedback_call_count(), 0);
    assert!(harness.dictionary.queries.lock().expect("lock").is_empty());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.bus.records().is_empty());
}

#[tokio::test]
async fn low_similarity_triggers_lexical_fallback_with_dedup() {
    let vector = ScriptedVector::default().with_hits(
        S1_SENTENCE,
        vec![example("예문 하나"), example("예문 둘")],
        0.41,
    );
    // One duplicate of a dense hit plus two fresh examples.
    let lexical = ScriptedLexical {
        examples: vec![
            example("예문 둘"),
            example("새로운 패턴 문장 하나"),
            example("새로운 패턴 문장 둘"),
        ],
        calls: AtomicUsize::new(0),
    };
    // Eojeol-level analysis must succeed so the fallback can build a query.
    let analyzer = ScriptedAnalyzer::splitting_into(&[S1_SENTENCE])
        .with_pos("나는", &[("나", "NP"), ("는", "JX")])
        .with_pos("비빔밥은", &[("비빔밥", "NNG"), ("은", "JX")])
        .with_pos("먹었다.", &[("먹", "VV"), ("었", "EP"), ("다", "EF"), (".", "SF")]);
    let harness = harness(
        s1_gateway(),
        vector,
        lexical,
        ScriptedDictionary::default(),
        analyzer,
    );

    let response = harness
        .facade
        .create_feedback(request(S1_SENTENCE), "session-3")
        .await
        .expect("pipeline");
    assert_eq!(response.sentences.len(), 1);

    // Invoked exactly once.
    assert_eq!(harness.lexical.calls.load(Ordering::SeqCst), 1);

    // First call saw 4 distinct examples: 2 dense + 2 new from the fallback.
    let calls = harness.gateway.correction_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].matches("원문:").count(), 4);
    assert_eq!(calls[0].matches("예문 둘").count(), 1);
}

#[tokio::test]
async fn non_candidate_sentences_bypass_the_llm() {
    let clean = "나는 밥을 먹었다";
    let gateway = s1_gateway();
    let vector = ScriptedVector::default().with_hits(
        S1_SENTENCE,
        vec![example("예문 하나")],
        0.72,
    );
    let analyzer =
        ScriptedAnalyzer::splitting_into(&[clean, S1_SENTENCE]).with_clean_pos(clean);
    let harness = harness(
        gateway,
        vector,
        ScriptedLexical::default(),
        ScriptedDictionary::default(),
        analyzer,
    );

    let response = harness
        .facade
        .create_feedback(request("본문"), "session-4")
        .await
        .expect("pipeline");

    assert_eq!(response.sentences.len(), 2);
    assert_eq!(response.sentences[0].sentence_id, 0);
    assert!(!response.sentences[0].is_error);

    // Only the candidate reached the gateway.
    let calls = harness.gateway.correction_calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].contains(S1_SENTENCE));
    assert!(!calls.iter().any(|call| call.contains(clean)));
}

#[tokio::test]
async fn one_failing_grammar_task_does_not_poison_the_others() {
    let first = "첫째 문장은 틀렸다.";
    let second = "둘째 문장은 실패한다.";
    let third = "셋째 문장은 틀렸다.";

    let corrected = |s: &str| format!("{s} (교정)");
    let mut gateway = ScriptedGateway::default().with_context("전체적으로 좋은 글입니다.");
    for sentence in [first, second, third] {
        gateway = gateway
            .with_correction(
                sentence,
                json!({
                    "is_error": true,
                    "corrected_sentence": corrected(sentence),
                    "errors": ["은"],
                }),
            )
            .with_feedback(
                sentence,
                json!({
                    "corrected_sentence": corrected(sentence),
                    "feedbacks": [{ "corrects": "은 -> 이", "reason": "주격 조사가 필요합니다." }],
                }),
            );
    }
    let gateway = gateway.failing_correction_for(second);

    let harness = harness(
        gateway,
        ScriptedVector::default(),
        ScriptedLexical::default(),
        ScriptedDictionary::default(),
        ScriptedAnalyzer::splitting_into(&[first, second, third]),
    );

    let response = harness
        .facade
        .create_feedback(request("본문"), "session-5")
        .await
        .expect("pipeline");

    assert_eq!(response.sentences.len(), 3);
    let ids: Vec<u32> = response.sentences.iter().map(|s| s.sentence_id).collect();
    assert_eq!(ids, vec![0, 1, 2]);

    assert!(response.sentences[0].is_error);
    assert!(response.sentences[0].grammar_feedback.is_some());
    assert!(!response.sentences[1].is_error);
    assert!(response.sentences[1].grammar_feedback.is_none());
    assert!(response.sentences[2].is_error);
    assert!(response.sentences[2].grammar_feedback.is_some());

    assert_eq!(
        response.context_feedback.feedback,
        "전체적으로 좋은 글입니다."
    );

    // Events only for the two corrected sentences.
    let records = published_records(&harness.bus).await;
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn context_failure_is_replaced_with_a_stub() {
    let harness = harness(
        ScriptedGateway::default(),
        ScriptedVector::default(),
        ScriptedLexical::default(),
        ScriptedDictionary::default(),
        ScriptedAnalyzer::splitting_into(&["문장 하나."]),
    );

    let response = harness
        .facade
        .create_feedback(request("본문"), "session-6")
        .await
        .expect("pipeline");

    assert_eq!(response.context_feedback.feedback, CONTEXT_FAILURE_STUB);
}

#[tokio::test]
async fn publish_failure_hands_the_full_batch_to_the_fallback_sink() {
    let sink = Arc::new(RecordingSink::default());
    let publisher = CollectEventPublisher::new(
        Arc::new(FailingBus) as Arc<dyn EventBus>,
        "grammar-feedback",
        Some(Arc::clone(&sink) as Arc<dyn FallbackSink>),
    );

    let events = vec![
        GrammarFeedbackEvent {
            user_id: "session-7".to_owned(),
            timestamp: "2025-11-02T12:00:00+00:00".to_owned(),
            sentence_id: 0,
            original_text: S1_SENTENCE.to_owned(),
            corrected_text: S1_CORRECTED.to_owned(),
            feedbacks: vec![FeedbackDetail {
                corrects: "비빔밥은 -> 비빔밥을".to_owned(),
                reason: "목적격 조사".to_owned(),
            }],
        },
        GrammarFeedbackEvent {
            user_id: "session-7".to_owned(),
            timestamp: "2025-11-02T12:00:01+00:00".to_owned(),
            sentence_id: 2,
            original_text: "다른 문장은 틀렸다.".to_owned(),
            corrected_text: "다른 문장이 틀렸다.".to_owned(),
            feedbacks: Vec::new(),
        },
    ];

    publisher.publish_safe(&events).await;

    let batches = sink.batches.lock().expect("lock");
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0], events);
}

#[tokio::test]
async fn empty_event_batch_is_a_no_op() {
    let bus = Arc::new(RecordingBus::default());
    let publisher = CollectEventPublisher::new(
        Arc::clone(&bus) as Arc<dyn EventBus>,
        "grammar-feedback",
        None,
    );

    publisher.publish_safe(&[]).await;

    assert!(bus.records().is_empty());
    assert_eq!(bus.flushes.load(Ordering::SeqCst), 0);
}
