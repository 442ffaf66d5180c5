//! Error types shared across the pipeline crates

use thiserror::Error;

/// Top-level error for engine boundaries
///
/// Crate-specific errors (retrieval, pipeline, config) convert into this
/// type at the trait seams so callers of `dyn` engines see one error shape.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Synthesis error: {0}")]
    Synthesis(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
