//! Best-effort publication of corrected-sentence events.
//!
//! One event per corrected sentence goes to a single topic on the message
//! bus for downstream data collection. Publication must never affect the
//! request that produced the events: every failure is logged and, when a
//! fallback sink is configured, the batch is handed to it instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde::Serialize;
use tracing::{error, info};

use crate::types::FeedbackDetail;

/// Flush deadline after a batch has been sent.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// One corrected sentence, ready for collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarFeedbackEvent {
    /// Session identifier of the author.
    pub user_id: String,
    /// ISO-8601 creation timestamp.
    pub timestamp: String,
    /// Sentence index within the request.
    pub sentence_id: u32,
    /// The sentence as written.
    pub original_text: String,
    /// The corrected sentence.
    pub corrected_text: String,
    /// The explained corrections.
    pub feedbacks: Vec<FeedbackDetail>,
}

/// Errors from event publication.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// An event could not be serialized.
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The bus rejected a send or the flush.
    #[error("event bus error: {0}")]
    Bus(String),

    /// The fallback sink failed.
    #[error("fallback sink error: {0}")]
    Sink(String),
}

/// Message bus interface.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Send one serialized record to a topic.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Bus`] when the bus rejects the record.
    async fn send(&self, topic: &str, payload: &str) -> Result<(), PublishError>;

    /// Flush buffered records.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Bus`] when flushing fails.
    async fn flush(&self) -> Result<(), PublishError>;
}

/// Last-resort sink used when the bus is unavailable.
#[async_trait]
pub trait FallbackSink: Send + Sync {
    /// Persist the full batch somewhere durable.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Sink`]; the caller only logs it.
    async fn save(&self, events: &[GrammarFeedbackEvent]) -> Result<(), PublishError>;
}

/// Kafka-backed event bus.
pub struct KafkaBus {
    producer: FutureProducer,
}

impl KafkaBus {
    /// Create a producer against the given bootstrap servers.
    ///
    /// # Errors
    ///
    /// Returns an error when the producer cannot be constructed.
    pub fn new(bootstrap_servers: &str) -> anyhow::Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self { producer })
    }
}

impl std::fmt::Debug for KafkaBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaBus").finish_non_exhaustive()
    }
}

#[async_trait]
impl EventBus for KafkaBus {
    async fn send(&self, topic: &str, payload: &str) -> Result<(), PublishError> {
        let record: FutureRecord<'_, (), str> = FutureRecord::to(topic).payload(payload);
        self.producer
            .send(record, Timeout::Never)
            .await
            .map(|_| ())
            .map_err(|(e, _)| PublishError::Bus(e.to_string()))
    }

    async fn flush(&self) -> Result<(), PublishError> {
        self.producer
            .flush(Timeout::After(FLUSH_TIMEOUT))
            .map_err(|e| PublishError::Bus(e.to_string()))
    }
}

/// Publishes corrected-sentence events without ever raising.
pub struct CollectEventPublisher {
    bus: Arc<dyn EventBus>,
    topic: String,
    fallback: Option<Arc<dyn FallbackSink>>,
}

impl CollectEventPublisher {
    /// Create a publisher for the given topic.
    pub fn new(
        bus: Arc<dyn EventBus>,
        topic: impl Into<String>,
        fallback: Option<Arc<dyn FallbackSink>>,
    ) -> Self {
        Self {
            bus,
            topic: topic.into(),
            fallback,
        }
    }

    /// Publish a batch, swallowing every failure.
    ///
    /// An empty batch is a no-op. On failure the whole batch is offered to
    /// the fallback sink, whose own failure is logged and dropped.
    pub async fn publish_safe(&self, events: &[GrammarFeedbackEvent]) {
        if events.is_empty() {
            info!("attempted to publish, but event list is empty");
            return;
        }

        info!(
            count = events.len(),
            topic = %self.topic,
            "publishing grammar events"
        );

        match self.try_publish(events).await {
            Ok(()) => info!(count = events.len(), "published events and flushed"),
            Err(e) => {
                error!(error = %e, "failed to publish grammar events");
                if let Some(fallback) = &self.fallback {
                    if let Err(e) = fallback.save(events).await {
                        error!(error = %e, "failed to save grammar events to fallback sink");
                    }
                }
            }
        }
    }

    async fn try_publish(&self, events: &[GrammarFeedbackEvent]) -> Result<(), PublishError> {
        for event in events {
            let payload = serde_json::to_string(&to_record(event))?;
            self.bus.send(&self.topic, &payload).await?;
        }
        self.bus.flush().await
    }
}

impl std::fmt::Debug for CollectEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectEventPublisher")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// Flatten an event into its wire record.
fn to_record(event: &GrammarFeedbackEvent) -> CollectRecord<'_> {
    CollectRecord {
        user_id: &event.user_id,
        timestamp: &event.timestamp,
        sentence_id: event.sentence_id,
        original_text: &event.original_text,
        corrected_text: &event.corrected_text,
        feedbacks: &event.feedbacks,
    }
}

/// Wire record sent to the collection topic.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectRecord<'a> {
    /// Session identifier of the author.
    user_id: &'a str,
    /// ISO-8601 creation timestamp.
    timestamp: &'a str,
    /// Sentence index within the request.
    sentence_id: u32,
    /// The sentence as written.
    original_text: &'a str,
    /// The corrected sentence.
    corrected_text: &'a str,
    /// The explained corrections.
    feedbacks: &'a [FeedbackDetail],
}
