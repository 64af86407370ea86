//! Episode render submission.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use studio_core::episode::EpisodeRequest;
use studio_events::payload::RENDER_MODE;
use studio_pipeline::run_render_job;

use crate::error::{AppError, AppResult};
use crate::middleware::api_key::ApiKey;
use crate::state::AppState;

/// Body returned when a job is accepted.
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub episode_id: String,
    pub job_id: String,
    /// Shots in the submitted storyboard.
    pub shot_count: usize,
    pub render_mode: &'static str,
}

/// POST /render-full-episode
///
/// Validate the request, answer 202 immediately and run the render on a
/// background task. Render outcomes are only reported via callbacks.
pub async fn render_full_episode(
    _key: ApiKey,
    State(state): State<AppState>,
    body: Result<Json<EpisodeRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    request.validate()?;

    let response = AcceptedResponse {
        accepted: true,
        episode_id: request.episode_id.clone(),
        job_id: request.job_id.clone(),
        shot_count: request.storyboard.len(),
        render_mode: RENDER_MODE,
    };

    tracing::info!(
        episode_id = %request.episode_id,
        job_id = %request.job_id,
        shots = response.shot_count,
        "Render job accepted"
    );

    let config = state.config.clone();
    let http = state.http.clone();
    tokio::spawn(async move {
        run_render_job(http, &config.pipeline, request).await;
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}
