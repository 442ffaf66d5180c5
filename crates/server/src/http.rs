//! HTTP endpoints
//!
//! `POST /api/pipeline` runs the full decode→transcribe→retrieve→compose→
//! synthesize chain on an uploaded audio file. `POST /api/index/rebuild`
//! is the out-of-band administrative rebuild. Error bodies always carry
//! `{code, stage, message}` so callers never have to guess which stage
//! failed.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use policy_voice_pipeline::{PipelineError, PipelineRequest, PipelineResponse, PipelineStage};
use policy_voice_retrieval::{Catalog, RetrievalError};

use crate::state::AppState;

/// Uploads larger than this are rejected outright; the duration ceiling
/// does the fine-grained limiting after decode.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/pipeline", post(run_pipeline))
        .route("/api/index/rebuild", post(rebuild_index))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Transport-level error wrapper
enum ApiError {
    Pipeline(PipelineError),
    BadRequest(String),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        ApiError::Pipeline(err)
    }
}

impl From<RetrievalError> for ApiError {
    fn from(err: RetrievalError) -> Self {
        ApiError::Pipeline(PipelineError::Retrieval(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, stage, message) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                PipelineStage::Received,
                message,
            ),
            ApiError::Pipeline(err) => {
                let status = match &err {
                    PipelineError::AudioTooLong { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    PipelineError::AudioDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    PipelineError::Retrieval(RetrievalError::IndexUnavailable) => {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                    PipelineError::SynthesisEmpty => StatusCode::BAD_GATEWAY,
                    PipelineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = err.to_string();
                (status, err.code(), err.stage(), message)
            }
        };

        tracing::warn!(code, ?stage, %message, "Request failed");
        let body = json!({
            "code": code,
            "stage": stage,
            "message": message,
        });
        (status, Json(body)).into_response()
    }
}

/// Run the full pipeline on an uploaded audio file
async fn run_pipeline(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PipelineResponse>, ApiError> {
    let mut audio: Option<Vec<u8>> = None;
    let mut request_template = PipelineRequest::new(Vec::new())
        .with_engine(state.settings.asr.default_engine)
        .with_tts_engine(state.settings.tts.default_engine);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read audio part: {e}")))?;
                audio = Some(bytes.to_vec());
            }
            "engine" => {
                let value = text_field(field, &name).await?;
                let engine = value
                    .parse()
                    .map_err(|e: String| ApiError::BadRequest(e))?;
                request_template = request_template.with_engine(engine);
            }
            "tts_engine" => {
                let value = text_field(field, &name).await?;
                let engine = value
                    .parse()
                    .map_err(|e: String| ApiError::BadRequest(e))?;
                request_template = request_template.with_tts_engine(engine);
            }
            "language" => {
                request_template = request_template.with_language(text_field(field, &name).await?);
            }
            "beam_size" => {
                let value = text_field(field, &name).await?;
                let beam: u32 = value
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid beam_size: {value}")))?;
                request_template = request_template.with_beam_size(beam);
            }
            "top_k" => {
                let value = text_field(field, &name).await?;
                let top_k: usize = value
                    .parse()
                    .map_err(|_| ApiError::BadRequest(format!("invalid top_k: {value}")))?;
                if top_k == 0 {
                    return Err(ApiError::BadRequest("top_k must be at least 1".to_string()));
                }
                request_template = request_template.with_top_k(top_k);
            }
            "voice" => {
                request_template = request_template.with_voice(text_field(field, &name).await?);
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown form field");
            }
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("missing 'audio' part".to_string()))?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("'audio' part is empty".to_string()));
    }
    request_template.audio = audio;

    let response = state.orchestrator.run(request_template).await?;
    Ok(Json(response))
}

async fn text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read '{name}' field: {e}")))
}

/// Administrative full rebuild from the source catalog
async fn rebuild_index(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let catalog = Catalog::from_path(&state.settings.retrieval.catalog_path)?;
    let outcome = state.index.rebuild(&catalog).await?;

    Ok(Json(json!({
        "records": catalog.len(),
        "points": outcome.points(),
    })))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "index_points": state.index.point_count().await,
    }))
}
