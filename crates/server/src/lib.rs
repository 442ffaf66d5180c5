//! HTTP transport for the policy voice pipeline
//!
//! The transport stays thin: it parses multipart uploads into a
//! `PipelineRequest`, runs the orchestrator, and maps each pipeline
//! failure to a distinct status code and caller-visible error body.

pub mod http;
pub mod state;

pub use http::create_router;
pub use state::AppState;
