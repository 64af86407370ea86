use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::Value;
use studio_comfyui::api::normalize_url;
use studio_comfyui::locator::{candidate_urls, locate, LocatedBackend, DEFAULT_COMFYUI_URLS};
use studio_events::payload::RENDER_MODE;
use studio_pipeline::backend::resolve_checkpoint;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Health check response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether a ComfyUI instance answered the probe.
    pub comfyui_online: bool,
    /// The live instance, else the configured or first default URL.
    pub comfyui_url: String,
    pub comfyui_version: Option<String>,
    pub render_mode: &'static str,
    pub default_checkpoint: Option<String>,
}

/// Backend detail payload.
#[derive(Debug, Serialize)]
pub struct ComfyHealthResponse {
    pub status: &'static str,
    pub comfyui_url: String,
    pub system: Value,
    pub devices: Value,
    pub workflow_path: String,
    pub checkpoint: String,
    pub default_checkpoint: Option<String>,
}

async fn locate_backend(state: &AppState) -> Option<LocatedBackend> {
    let settings = &state.config.pipeline;
    let candidates = candidate_urls(None, settings.comfyui_url.as_deref(), &settings.fallback_urls);
    locate(&state.http, &candidates).await
}

/// GET /health -- service status plus a backend probe. Always 200.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let settings = &state.config.pipeline;
    let located = locate_backend(&state).await;

    let (comfyui_url, comfyui_version, default_checkpoint) = match &located {
        Some(backend) => (
            backend.url().to_string(),
            backend.version().map(str::to_string),
            resolve_checkpoint(&backend.api, settings.checkpoint.as_deref()).await,
        ),
        None => (
            normalize_url(
                settings
                    .comfyui_url
                    .as_deref()
                    .or_else(|| settings.fallback_urls.first().map(String::as_str))
                    .unwrap_or(DEFAULT_COMFYUI_URLS[0]),
            ),
            None,
            None,
        ),
    };

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        comfyui_online: located.is_some(),
        comfyui_url,
        comfyui_version,
        render_mode: RENDER_MODE,
        default_checkpoint,
    })
}

/// GET /comfy/health -- backend system info, 503 when none is reachable.
async fn comfy_health(State(state): State<AppState>) -> AppResult<Json<ComfyHealthResponse>> {
    let settings = &state.config.pipeline;
    let backend = locate_backend(&state)
        .await
        .ok_or_else(|| AppError::ServiceUnavailable("ComfyUI not reachable".into()))?;

    let default_checkpoint = resolve_checkpoint(&backend.api, settings.checkpoint.as_deref()).await;
    let system = backend.stats.get("system").cloned().unwrap_or_else(|| Value::Object(Default::default()));
    let devices = backend.stats.get("devices").cloned().unwrap_or_else(|| Value::Array(Vec::new()));

    Ok(Json(ComfyHealthResponse {
        status: "ok",
        comfyui_url: backend.url().to_string(),
        system,
        devices,
        workflow_path: settings
            .workflow_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        checkpoint: settings.checkpoint.clone().unwrap_or_default(),
        default_checkpoint,
    }))
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/comfy/health", get(comfy_health))
}
