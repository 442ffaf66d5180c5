//! Application state
//!
//! One handle object built at startup and shared by every request
//! handler. There is no global mutable state; tests construct this with
//! fake engines.

use std::sync::Arc;

use policy_voice_config::Settings;
use policy_voice_pipeline::PipelineOrchestrator;
use policy_voice_retrieval::CatalogIndex;

/// Shared per-process state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub index: Arc<CatalogIndex>,
}

impl AppState {
    pub fn new(
        settings: Settings,
        orchestrator: Arc<PipelineOrchestrator>,
        index: Arc<CatalogIndex>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            orchestrator,
            index,
        }
    }
}
