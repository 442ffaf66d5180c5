//! Server entry point
//!
//! Startup order matters: settings are validated and the catalog index is
//! opened (or fully built) before the listener accepts traffic, so an
//! unusable index can never serve requests. `--rebuild-index` runs the
//! administrative rebuild and exits without serving.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use policy_voice_config::{load_settings, Settings};
use policy_voice_core::{AsrEngine, TtsEngine};
use policy_voice_pipeline::{
    EngineRegistry, FfmpegDecoder, HttpAsrConfig, HttpSpeechClient, HttpTranscriber, HttpTtsConfig,
    OrchestratorConfig, PipelineOrchestrator,
};
use policy_voice_retrieval::{
    Catalog, CatalogIndex, CatalogIndexConfig, QdrantIndex, Retriever, RetrieverConfig,
    TextEmbedder,
};
use policy_voice_server::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("POLICY_VOICE_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            // Tracing is not up yet
            eprintln!("Warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_env = env.as_deref().unwrap_or("default"),
        "Starting policy-voice"
    );

    // Fatal before serving: missing catalog or bad tunables stop the process
    settings.validate()?;

    let embedder = build_embedder(&settings)?;
    tracing::info!(
        model = embedder.model_name(),
        dim = embedder.dim(),
        "Embedding model ready"
    );

    let store = QdrantIndex::connect(
        &settings.retrieval.qdrant_endpoint,
        settings.retrieval.qdrant_api_key.as_deref(),
    )?;
    let index = Arc::new(CatalogIndex::new(
        Arc::new(store),
        embedder,
        CatalogIndexConfig {
            collection_base: settings.retrieval.collection_base.clone(),
            batch_size: settings.retrieval.index_batch_size,
        },
    ));

    let catalog = Catalog::from_path(&settings.retrieval.catalog_path)?;

    if std::env::args().any(|arg| arg == "--rebuild-index") {
        let outcome = index.rebuild(&catalog).await?;
        tracing::info!(points = outcome.points(), "Index rebuild complete, exiting");
        return Ok(());
    }

    let outcome = index.open_or_build(&catalog).await?;
    tracing::info!(points = outcome.points(), "Catalog index ready");

    let registry = build_engine_registry(&settings)?;
    let retriever = Arc::new(Retriever::new(
        Arc::clone(&index),
        RetrieverConfig::from(&settings.retrieval),
    ));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        registry,
        retriever,
        OrchestratorConfig::from(&settings),
    ));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let state = AppState::new(settings, orchestrator, index);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_engine_registry(settings: &Settings) -> anyhow::Result<Arc<EngineRegistry>> {
    let primary_asr = HttpTranscriber::new(
        AsrEngine::Primary,
        HttpAsrConfig {
            url: settings.asr.primary_url.clone(),
            timeout_ms: settings.asr.timeout_ms,
        },
    )?;
    let fallback_asr = HttpTranscriber::new(
        AsrEngine::Fallback,
        HttpAsrConfig {
            url: settings.asr.fallback_url.clone(),
            timeout_ms: settings.asr.timeout_ms,
        },
    )?;
    let standard_tts = HttpSpeechClient::new(
        TtsEngine::Standard,
        HttpTtsConfig {
            url: settings.tts.standard_url.clone(),
            timeout_ms: settings.tts.timeout_ms,
        },
    )?;
    let neural_tts = HttpSpeechClient::new(
        TtsEngine::Neural,
        HttpTtsConfig {
            url: settings.tts.neural_url.clone(),
            timeout_ms: settings.tts.timeout_ms,
        },
    )?;

    Ok(Arc::new(EngineRegistry {
        decoder: Arc::new(FfmpegDecoder::new(settings.audio.ffmpeg_bin.clone())),
        primary_asr: Arc::new(primary_asr),
        fallback_asr: Arc::new(fallback_asr),
        standard_tts: Arc::new(standard_tts),
        neural_tts: Arc::new(neural_tts),
    }))
}

#[cfg(feature = "onnx")]
fn build_embedder(settings: &Settings) -> anyhow::Result<Arc<dyn TextEmbedder>> {
    use policy_voice_retrieval::{EmbeddingConfig, OnnxEmbedder};

    let embedder = OnnxEmbedder::new(
        &settings.retrieval.embed_model_path,
        &settings.retrieval.embed_tokenizer_path,
        EmbeddingConfig {
            embedding_dim: settings.retrieval.embed_dim,
            ..Default::default()
        },
    )?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "onnx"))]
fn build_embedder(settings: &Settings) -> anyhow::Result<Arc<dyn TextEmbedder>> {
    use policy_voice_retrieval::HashEmbedder;

    tracing::warn!(
        "Built without the `onnx` feature; using the deterministic hash embedder. \
         Retrieval quality will be poor outside development."
    );
    Ok(Arc::new(HashEmbedder::with_dim(
        settings.retrieval.embed_dim,
    )))
}
