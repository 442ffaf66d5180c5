//! Pipeline orchestrator
//!
//! Sequences one request through
//! `Received → Decoded → Transcribed → Retrieved → Composed → Synthesized
//! → Completed`, strictly in order and with no automatic retries. The
//! duration ceiling is enforced on decoded audio before any transcription
//! work is paid for, and the wall-clock decode time in the response is
//! measured around the transcription call only.
//!
//! All engines live in an [`EngineRegistry`] built once at startup and
//! shared across requests; per-request tunables (language, beam width,
//! voice) travel in the request and the per-call options, never as
//! mutations of shared engine state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use policy_voice_core::{
    AsrEngine, AudioDecoder, AudioFormat, SpeechBackend, TranscribeOptions, Transcriber, TtsEngine,
};
use policy_voice_retrieval::{Retriever, SearchResult};

use crate::compose::{ComposerConfig, UtteranceComposer};
use crate::tts::{SpeechSynthesizer, SynthesizerConfig};
use crate::PipelineError;

/// All engine instances, constructed once at process start
///
/// Shared read-only across concurrent requests; tests substitute fakes
/// for any of the trait objects.
pub struct EngineRegistry {
    pub decoder: Arc<dyn AudioDecoder>,
    pub primary_asr: Arc<dyn Transcriber>,
    pub fallback_asr: Arc<dyn Transcriber>,
    pub standard_tts: Arc<dyn SpeechBackend>,
    pub neural_tts: Arc<dyn SpeechBackend>,
}

impl EngineRegistry {
    pub fn transcriber(&self, engine: AsrEngine) -> Arc<dyn Transcriber> {
        match engine {
            AsrEngine::Primary => Arc::clone(&self.primary_asr),
            AsrEngine::Fallback => Arc::clone(&self.fallback_asr),
        }
    }

    pub fn speech_backend(&self, engine: TtsEngine) -> Arc<dyn SpeechBackend> {
        match engine {
            TtsEngine::Standard => Arc::clone(&self.standard_tts),
            TtsEngine::Neural => Arc::clone(&self.neural_tts),
        }
    }
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Input duration ceiling in seconds
    pub max_audio_seconds: u64,
    /// Language handed to the engines when the caller does not override it
    pub default_language: String,
    /// Voice used when the caller does not pick one
    pub default_voice: String,
    /// Chunk limit handed to the synthesizers
    pub max_chunk_chars: usize,
    /// Whole-request deadline; `None` disables it
    pub request_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        use policy_voice_config::constants::{audio, tts};
        Self {
            max_audio_seconds: audio::MAX_AUDIO_SECONDS,
            default_language: "ko".to_string(),
            default_voice: tts::DEFAULT_VOICE.to_string(),
            max_chunk_chars: tts::MAX_CHUNK_CHARS,
            request_timeout: None,
        }
    }
}

impl From<&policy_voice_config::Settings> for OrchestratorConfig {
    fn from(settings: &policy_voice_config::Settings) -> Self {
        let timeout = match settings.server.request_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self {
            max_audio_seconds: settings.audio.max_audio_seconds,
            default_language: settings.asr.default_language.clone(),
            default_voice: settings.tts.default_voice.clone(),
            max_chunk_chars: settings.tts.max_chunk_chars,
            request_timeout: timeout,
        }
    }
}

/// One pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Raw audio bytes in any container/codec ffmpeg understands
    pub audio: Vec<u8>,
    pub engine: AsrEngine,
    pub language: Option<String>,
    pub beam_size: Option<u32>,
    pub top_k: Option<usize>,
    pub voice: Option<String>,
    pub tts_engine: TtsEngine,
}

impl PipelineRequest {
    pub fn new(audio: Vec<u8>) -> Self {
        Self {
            audio,
            engine: AsrEngine::default(),
            language: None,
            beam_size: None,
            top_k: None,
            voice: None,
            tts_engine: TtsEngine::default(),
        }
    }

    pub fn with_engine(mut self, engine: AsrEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_beam_size(mut self, beam_size: u32) -> Self {
        self.beam_size = Some(beam_size);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_tts_engine(mut self, engine: TtsEngine) -> Self {
        self.tts_engine = engine;
        self
    }
}

/// Transcription metadata in the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionBlock {
    pub text: String,
    pub engine: AsrEngine,
    /// Wall-clock seconds spent in the transcription call only
    pub decode_seconds: f64,
    /// Duration of the decoded input audio
    pub audio_seconds: f64,
    pub language: Option<String>,
}

/// Retrieval results in the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBlock {
    /// Query text (the transcript)
    pub query: String,
    /// Requested number of results
    pub top_k: usize,
    pub results: Vec<SearchResult>,
}

/// Synthesized audio in the response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisBlock {
    pub engine: TtsEngine,
    pub voice: String,
    pub format: AudioFormat,
    #[serde(with = "base64_bytes")]
    pub audio: Vec<u8>,
    /// Playback estimate from a character-count heuristic, not measured
    /// from the audio
    pub estimated_seconds: f64,
}

/// Structured result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResponse {
    pub transcription: TranscriptionBlock,
    pub search: SearchBlock,
    /// Spoken utterance the synthesis block was generated from
    pub utterance: String,
    pub synthesis: SynthesisBlock,
}

/// The pipeline orchestrator
pub struct PipelineOrchestrator {
    engines: Arc<EngineRegistry>,
    retriever: Arc<Retriever>,
    composer: UtteranceComposer,
    standard_synthesizer: SpeechSynthesizer,
    neural_synthesizer: SpeechSynthesizer,
    config: OrchestratorConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        engines: Arc<EngineRegistry>,
        retriever: Arc<Retriever>,
        config: OrchestratorConfig,
    ) -> Self {
        let synthesizer_config = SynthesizerConfig {
            max_chunk_chars: config.max_chunk_chars,
        };
        let standard_synthesizer = SpeechSynthesizer::new(
            engines.speech_backend(TtsEngine::Standard),
            synthesizer_config.clone(),
        );
        let neural_synthesizer = SpeechSynthesizer::new(
            engines.speech_backend(TtsEngine::Neural),
            synthesizer_config,
        );

        Self {
            engines,
            retriever,
            composer: UtteranceComposer::new(ComposerConfig::default()),
            standard_synthesizer,
            neural_synthesizer,
            config,
        }
    }

    fn synthesizer(&self, engine: TtsEngine) -> &SpeechSynthesizer {
        match engine {
            TtsEngine::Standard => &self.standard_synthesizer,
            TtsEngine::Neural => &self.neural_synthesizer,
        }
    }

    /// Run one request, bounded by the configured deadline
    ///
    /// A timeout aborts the pipeline wherever it is; no partial side
    /// effects exist, so there is nothing to roll back.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        match self.config.request_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.execute(request))
                .await
                .map_err(|_| PipelineError::Timeout { after: deadline })?,
            None => self.execute(request).await,
        }
    }

    async fn execute(&self, request: PipelineRequest) -> Result<PipelineResponse, PipelineError> {
        // Decoded
        let audio = self
            .engines
            .decoder
            .decode(&request.audio)
            .await
            .map_err(|e| PipelineError::AudioDecode(engine_message(e)))?;
        let audio_seconds = audio.seconds();

        // Reject long audio before paying for transcription
        if audio_seconds > self.config.max_audio_seconds as f64 {
            return Err(PipelineError::AudioTooLong {
                limit_seconds: self.config.max_audio_seconds,
                actual_seconds: audio_seconds,
            });
        }

        // Transcribed
        let transcriber = self.engines.transcriber(request.engine);
        let options = TranscribeOptions {
            language: request
                .language
                .clone()
                .or_else(|| Some(self.config.default_language.clone())),
            beam_size: request.beam_size,
        };
        let started = Instant::now();
        let transcript = transcriber
            .transcribe(&audio.samples, &options)
            .await
            .map_err(|e| PipelineError::Transcription(engine_message(e)))?;
        let decode_seconds = round3(started.elapsed().as_secs_f64());

        tracing::info!(
            engine = transcriber.engine_name(),
            decode_seconds,
            audio_seconds,
            transcript_chars = transcript.text.chars().count(),
            "Transcription complete"
        );

        // Retrieved; an empty transcript flows through as an empty result set
        let top_k = request.top_k.unwrap_or_else(|| self.retriever.default_top_k());
        let results = self.retriever.search(&transcript.text, top_k).await?;

        // Composed; this step never fails
        let utterance = self.composer.compose(&results);

        // Synthesized
        let voice = request
            .voice
            .clone()
            .unwrap_or_else(|| self.config.default_voice.clone());
        let synthesizer = self.synthesizer(request.tts_engine);
        let audio_bytes = synthesizer
            .synthesize(&utterance, &voice)
            .await
            .map_err(|e| PipelineError::Synthesis(engine_message(e)))?;
        if audio_bytes.is_empty() {
            return Err(PipelineError::SynthesisEmpty);
        }

        // Completed
        Ok(PipelineResponse {
            transcription: TranscriptionBlock {
                text: transcript.text.clone(),
                engine: request.engine,
                decode_seconds,
                audio_seconds,
                language: transcript.language,
            },
            search: SearchBlock {
                query: transcript.text,
                top_k,
                results,
            },
            synthesis: SynthesisBlock {
                engine: request.tts_engine,
                voice,
                format: synthesizer.audio_format(),
                audio: audio_bytes,
                estimated_seconds: estimate_playback_seconds(&utterance),
            },
            utterance,
        })
    }
}

/// Playback estimate: ~8 chars per spoken second, floored at 1.5 s.
/// A UI hint, not a measurement.
fn estimate_playback_seconds(text: &str) -> f64 {
    let estimate = (text.chars().count() as f64 / 8.0).max(1.5);
    (estimate * 100.0).round() / 100.0
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn engine_message(err: policy_voice_core::Error) -> String {
    use policy_voice_core::Error;
    match err {
        Error::Audio(msg)
        | Error::Transcription(msg)
        | Error::Synthesis(msg)
        | Error::Retrieval(msg)
        | Error::Config(msg) => msg,
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use policy_voice_core::{
        DecodedAudio, Error, Result as CoreResult, Transcription, TARGET_SAMPLE_RATE,
    };
    use policy_voice_retrieval::{
        Catalog, CatalogIndex, CatalogIndexConfig, HashEmbedder, MemoryIndex, RetrieverConfig,
    };
    use crate::PipelineStage;

    struct FakeDecoder {
        seconds: f64,
    }

    #[async_trait]
    impl AudioDecoder for FakeDecoder {
        async fn decode(&self, _raw: &[u8]) -> CoreResult<DecodedAudio> {
            let samples = vec![0.0; (self.seconds * TARGET_SAMPLE_RATE as f64) as usize];
            Ok(DecodedAudio::new(samples, TARGET_SAMPLE_RATE))
        }

        fn name(&self) -> &str {
            "fake-decoder"
        }
    }

    struct RejectingDecoder;

    #[async_trait]
    impl AudioDecoder for RejectingDecoder {
        async fn decode(&self, _raw: &[u8]) -> CoreResult<DecodedAudio> {
            Err(Error::Audio("not audio. Hint: moov atom not found".to_string()))
        }

        fn name(&self) -> &str {
            "rejecting-decoder"
        }
    }

    struct FakeTranscriber {
        text: String,
        calls: AtomicUsize,
        last_options: Mutex<Option<TranscribeOptions>>,
    }

    impl FakeTranscriber {
        fn new(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
                last_options: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(
            &self,
            _pcm: &[f32],
            options: &TranscribeOptions,
        ) -> CoreResult<Transcription> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_options.lock() = Some(options.clone());
            Ok(Transcription::new(self.text.clone()))
        }

        fn engine_name(&self) -> &str {
            "fake-asr"
        }
    }

    struct FakeTts {
        payload: Vec<u8>,
        calls: AtomicUsize,
    }

    impl FakeTts {
        fn new(payload: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                payload,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SpeechBackend for FakeTts {
        async fn synthesize(&self, _text: &str, _voice: &str) -> CoreResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.payload.clone())
        }

        fn engine_name(&self) -> &str {
            "fake-tts"
        }

        fn audio_format(&self) -> AudioFormat {
            AudioFormat::Mp3
        }
    }

    const CATALOG: &str = "\
service_name,tags,support,requirement,url
Youth Housing Support,\"housing, youth\",Monthly rent subsidy of 200000 won,Age 19-34,https://example.org/youth
Small Business Grant,\"business, startup\",One-time grant up to 5M won,Registered business,https://example.org/biz
";

    async fn retriever_over(csv: &str) -> Arc<Retriever> {
        let catalog = Catalog::from_reader(csv.as_bytes()).unwrap();
        let index = Arc::new(CatalogIndex::new(
            MemoryIndex::new(),
            Arc::new(HashEmbedder::with_dim(32)),
            CatalogIndexConfig {
                collection_base: "test_services".to_string(),
                batch_size: 16,
            },
        ));
        index.open_or_build(&catalog).await.unwrap();
        Arc::new(Retriever::new(index, RetrieverConfig::default()))
    }

    struct Harness {
        orchestrator: PipelineOrchestrator,
        primary: Arc<FakeTranscriber>,
        fallback: Arc<FakeTranscriber>,
        standard_tts: Arc<FakeTts>,
    }

    async fn harness(decoder_seconds: f64, transcript: &str, csv: &str) -> Harness {
        let primary = FakeTranscriber::new(transcript);
        let fallback = FakeTranscriber::new(transcript);
        let standard_tts = FakeTts::new(vec![0xAA; 64]);

        let engines = Arc::new(EngineRegistry {
            decoder: Arc::new(FakeDecoder {
                seconds: decoder_seconds,
            }),
            primary_asr: primary.clone(),
            fallback_asr: fallback.clone(),
            standard_tts: standard_tts.clone(),
            neural_tts: FakeTts::new(vec![0xBB; 32]),
        });

        let orchestrator = PipelineOrchestrator::new(
            engines,
            retriever_over(csv).await,
            OrchestratorConfig::default(),
        );

        Harness {
            orchestrator,
            primary,
            fallback,
            standard_tts,
        }
    }

    #[tokio::test]
    async fn test_happy_path() {
        let h = harness(3.0, "I need help with rent as a young person", CATALOG).await;
        let response = h
            .orchestrator
            .run(PipelineRequest::new(vec![1, 2, 3]))
            .await
            .unwrap();

        assert_eq!(
            response.transcription.text,
            "I need help with rent as a young person"
        );
        assert_eq!(response.transcription.engine, AsrEngine::Primary);
        assert_eq!(response.transcription.audio_seconds, 3.0);
        assert_eq!(response.search.top_k, 3);
        assert!(!response.search.results.is_empty());
        assert_eq!(response.search.results[0].rank, 1);
        assert!(response.utterance.contains(&response.search.results[0].service_name));
        assert_eq!(response.synthesis.audio, vec![0xAA; 64]);
        assert_eq!(response.synthesis.format, AudioFormat::Mp3);
        assert!(response.synthesis.estimated_seconds >= 1.5);
    }

    #[tokio::test]
    async fn test_duration_ceiling_rejects_before_transcription() {
        let h = harness(20.0, "whatever", CATALOG).await;
        let err = h
            .orchestrator
            .run(PipelineRequest::new(vec![0]))
            .await
            .unwrap_err();

        match err {
            PipelineError::AudioTooLong {
                limit_seconds,
                actual_seconds,
            } => {
                assert_eq!(limit_seconds, 15);
                assert_eq!(actual_seconds, 20.0);
            }
            other => panic!("expected AudioTooLong, got {other:?}"),
        }

        // The expensive call was never made
        assert_eq!(h.primary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.fallback.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.standard_tts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_maps_to_client_error() {
        let h = harness(1.0, "x", CATALOG).await;
        let engines = Arc::new(EngineRegistry {
            decoder: Arc::new(RejectingDecoder),
            primary_asr: h.primary.clone(),
            fallback_asr: h.fallback.clone(),
            standard_tts: h.standard_tts.clone(),
            neural_tts: h.standard_tts.clone(),
        });
        let orchestrator = PipelineOrchestrator::new(
            engines,
            retriever_over(CATALOG).await,
            OrchestratorConfig::default(),
        );

        let err = orchestrator
            .run(PipelineRequest::new(vec![0]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::AudioDecode(_)));
        assert!(err.is_client_error());
        assert_eq!(err.stage(), PipelineStage::Decoded);
        assert!(err.to_string().contains("moov atom"));
    }

    #[tokio::test]
    async fn test_engine_selection() {
        let h = harness(2.0, "business grant", CATALOG).await;
        h.orchestrator
            .run(PipelineRequest::new(vec![0]).with_engine(AsrEngine::Fallback))
            .await
            .unwrap();

        assert_eq!(h.primary.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_per_call_options_threaded() {
        let h = harness(2.0, "rent", CATALOG).await;
        h.orchestrator
            .run(
                PipelineRequest::new(vec![0])
                    .with_language("en")
                    .with_beam_size(5),
            )
            .await
            .unwrap();

        let options = h.primary.last_options.lock().clone().unwrap();
        assert_eq!(options.language.as_deref(), Some("en"));
        assert_eq!(options.beam_size, Some(5));
    }

    #[tokio::test]
    async fn test_default_language_applied() {
        let h = harness(2.0, "rent", CATALOG).await;
        h.orchestrator
            .run(PipelineRequest::new(vec![0]))
            .await
            .unwrap();

        let options = h.primary.last_options.lock().clone().unwrap();
        assert_eq!(options.language.as_deref(), Some("ko"));
        assert_eq!(options.beam_size, None);
    }

    #[tokio::test]
    async fn test_empty_catalog_speaks_not_found() {
        let h = harness(
            2.0,
            "anything at all",
            "service_name,tags,support,requirement,url\n",
        )
        .await;
        let response = h
            .orchestrator
            .run(PipelineRequest::new(vec![0]))
            .await
            .unwrap();

        assert!(response.search.results.is_empty());
        assert_eq!(response.utterance, crate::NOT_FOUND_UTTERANCE);
        // The not-found utterance is still spoken
        assert_eq!(h.standard_tts.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_synthesis_is_distinct_error() {
        let primary = FakeTranscriber::new("rent");
        let empty_tts = FakeTts::new(Vec::new());
        let engines = Arc::new(EngineRegistry {
            decoder: Arc::new(FakeDecoder { seconds: 1.0 }),
            primary_asr: primary.clone(),
            fallback_asr: primary.clone(),
            standard_tts: empty_tts.clone(),
            neural_tts: empty_tts,
        });
        let orchestrator = PipelineOrchestrator::new(
            engines,
            retriever_over(CATALOG).await,
            OrchestratorConfig::default(),
        );

        let err = orchestrator
            .run(PipelineRequest::new(vec![0]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SynthesisEmpty));
        assert_eq!(err.code(), "synthesis_empty");
    }

    #[tokio::test]
    async fn test_top_k_override() {
        let h = harness(2.0, "support", CATALOG).await;
        let response = h
            .orchestrator
            .run(PipelineRequest::new(vec![0]).with_top_k(1))
            .await
            .unwrap();

        assert_eq!(response.search.top_k, 1);
        assert_eq!(response.search.results.len(), 1);
    }

    #[tokio::test]
    async fn test_response_serializes_audio_as_base64() {
        let h = harness(2.0, "rent", CATALOG).await;
        let response = h
            .orchestrator
            .run(PipelineRequest::new(vec![0]))
            .await
            .unwrap();

        let json = serde_json::to_value(&response).unwrap();
        let encoded = json["synthesis"]["audio"].as_str().unwrap();
        use base64::{engine::general_purpose::STANDARD, Engine as _};
        assert_eq!(STANDARD.decode(encoded).unwrap(), vec![0xAA; 64]);

        // Round-trips
        let parsed: PipelineResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.synthesis.audio, response.synthesis.audio);
    }

    #[test]
    fn test_playback_estimate() {
        assert_eq!(estimate_playback_seconds(""), 1.5);
        assert_eq!(estimate_playback_seconds(&"a".repeat(80)), 10.0);
    }
}
