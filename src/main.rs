//! Service entry point: configuration, logging, dependency wiring, serving.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use gyojeong::config::Config;
use gyojeong::dictionary::{GrammarDictionary, PgDictionary};
use gyojeong::events::{CollectEventPublisher, EventBus, KafkaBus};
use gyojeong::feedback::{ContextService, FeedbackFacade, GrammarService};
use gyojeong::llm::clova::ClovaClient;
use gyojeong::llm::limiter::LlmRateLimiter;
use gyojeong::llm::LlmGateway;
use gyojeong::logging;
use gyojeong::morph::{MecabTagger, MorphAnalyzer};
use gyojeong::retrieval::lexical::{EsRetriever, LexicalSearch};
use gyojeong::retrieval::vector::{ChromaRetriever, Embedder, HttpEmbedder, VectorSearch};
use gyojeong::sentence::SentenceService;
use gyojeong::server::{self, AppState};

/// Chat-completion budget per rolling 60-second window.
const LLM_CALLS_PER_MINUTE: u32 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;

    let _logging_guard = match &config.logs_dir {
        Some(dir) => Some(logging::init_production(dir)?),
        None => {
            logging::init_console();
            None
        }
    };

    info!("gyojeong starting");

    // Process-wide singletons: one rate-limit bucket, one client per
    // collaborator, one lazily-created dictionary pool.
    let limiter = Arc::new(LlmRateLimiter::new(LLM_CALLS_PER_MINUTE));
    let gateway: Arc<dyn LlmGateway> = Arc::new(ClovaClient::new(
        &config.clova_api_key,
        &config.clova_url,
        Arc::clone(&limiter),
    ));

    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
        &config.embedding_host,
        &config.embedding_model,
    ));
    let vector: Arc<dyn VectorSearch> = Arc::new(ChromaRetriever::new(
        &config.chroma_host,
        &config.chroma_collection,
        embedder,
    ));
    let lexical: Arc<dyn LexicalSearch> = Arc::new(EsRetriever::new(
        &config.elasticsearch_host,
        &config.elasticsearch_index,
    ));
    let analyzer: Arc<dyn MorphAnalyzer> = Arc::new(MecabTagger::new(&config.tagger_host));
    let dictionary = Arc::new(PgDictionary::new(config.postgres.url()));

    let bus: Arc<dyn EventBus> = Arc::new(
        KafkaBus::new(&config.kafka_bootstrap_servers)
            .context("failed to create event bus producer")?,
    );
    let publisher = Arc::new(CollectEventPublisher::new(
        bus,
        config.kafka_topic.clone(),
        None,
    ));

    let context_service = ContextService::new(Arc::clone(&gateway));
    let grammar_service = Arc::new(GrammarService::new(
        gateway,
        vector,
        lexical,
        Arc::clone(&dictionary) as Arc<dyn GrammarDictionary>,
        Arc::clone(&analyzer),
        config.similarity_threshold,
    ));
    let sentence_service = SentenceService::new(analyzer, config.error_threshold);

    let facade = FeedbackFacade::new(context_service, grammar_service, sentence_service, publisher);
    let state = Arc::new(AppState { facade });
    let app = server::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    dictionary.close().await;
    info!("gyojeong shut down");
    Ok(())
}

/// Resolve when the process receives Ctrl-C / SIGINT.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
