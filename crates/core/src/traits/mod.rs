//! Capability traits for pluggable engine backends

mod speech;

pub use speech::{AudioDecoder, SpeechBackend, TranscribeOptions, Transcriber};
