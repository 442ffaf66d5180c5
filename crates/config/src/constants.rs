//! Centralized constants for the policy voice pipeline
//!
//! Single source of truth for tunables and service defaults. Settings
//! structs default to these values; changing a default here changes it
//! everywhere.

/// Audio input limits
pub mod audio {
    /// Sample rate every decoder must emit (Hz)
    pub const TARGET_SAMPLE_RATE: u32 = 16_000;

    /// Maximum accepted input duration (seconds); longer uploads are
    /// rejected before any transcription work is done
    pub const MAX_AUDIO_SECONDS: u64 = 15;
}

/// Retrieval and reranking tunables
pub mod retrieval {
    /// Default number of results returned to the caller
    pub const DEFAULT_TOP_K: usize = 3;

    /// Minimum candidate window fetched from the vector index so the
    /// reranker has room to reorder
    pub const OVERFETCH_MIN: usize = 10;

    /// Score bonus per query token found in a candidate's tag field
    pub const TAG_BONUS: f32 = 0.08;

    /// Score bonus per query token found in a candidate's support field;
    /// deliberately weaker than the tag bonus
    pub const SUPPORT_BONUS: f32 = 0.04;

    /// Records embedded and upserted per batch during index builds
    pub const INDEX_BATCH_SIZE: usize = 256;

    /// Base name for index collections; the full name carries the embedder
    /// dimension and a catalog fingerprint
    pub const COLLECTION_BASE: &str = "gov_services";
}

/// Synthesis tunables
pub mod tts {
    /// Largest text chunk sent to a synthesis backend in one call
    pub const MAX_CHUNK_CHARS: usize = 4000;

    /// Default voice for the standard engine
    pub const DEFAULT_VOICE: &str = "ko-KR-standard-a";

    /// Character budget for the spoken summary of the top result
    pub const MAX_SUMMARY_CHARS: usize = 180;
}

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Qdrant vector store endpoint (gRPC)
    pub const QDRANT_DEFAULT: &str = "http://127.0.0.1:6334";

    /// Primary ASR sidecar
    pub const ASR_PRIMARY_DEFAULT: &str = "http://127.0.0.1:8091";

    /// Fallback ASR sidecar
    pub const ASR_FALLBACK_DEFAULT: &str = "http://127.0.0.1:8092";

    /// Standard (cloud gateway) TTS service
    pub const TTS_STANDARD_DEFAULT: &str = "http://127.0.0.1:8093";

    /// Neural (local sidecar) TTS service
    pub const TTS_NEURAL_DEFAULT: &str = "http://127.0.0.1:8094";
}
