//! Shot render state machine.
//!
//! `Prepared -> Submitted -> Polling -> Completed | TimedOut | BackendError
//! -> Fetched`. A shot's graph is built from the job's [`WorkflowSource`],
//! queued on the backend, polled until its history record appears, and the
//! first output image is written to the job's frames directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use studio_comfyui::api::ComfyUIApiError;
use studio_comfyui::history::extract_output_images;
use studio_core::naming::shot_frame_filename;
use studio_core::prompt::ShotPrompt;
use studio_core::render_config::RenderConfig;
use studio_core::workflow::{shot_prefix, GenerationGraph, PatchRegistry, ShotParams, WorkflowSource};

use crate::backend::GenerationBackend;
use crate::reference::ReferenceError;

/// Delay between history polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1200);

/// Prefix of the per-shot client identifier.
pub const CLIENT_ID_PREFIX: &str = "studioai-";

const CLIENT_ID_TOKEN_LEN: usize = 10;

// ---------------------------------------------------------------------------
// States and errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotState {
    Prepared,
    Submitted,
    Polling,
    Completed,
    TimedOut,
    BackendError,
    Fetched,
}

impl fmt::Display for ShotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepared => "prepared",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
            Self::BackendError => "backend_error",
            Self::Fetched => "fetched",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShotError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),

    #[error("ComfyUI submit failed: {0}")]
    Submit(#[source] ComfyUIApiError),

    #[error("ComfyUI history poll failed for {prompt_id}: {source}")]
    Poll {
        prompt_id: String,
        #[source]
        source: ComfyUIApiError,
    },

    #[error("ComfyUI prompt timeout after {timeout_secs}s: {prompt_id}")]
    Timeout { prompt_id: String, timeout_secs: u64 },

    #[error("ComfyUI produced no output images for prompt {0}")]
    NoOutputImages(String),

    #[error("ComfyUI image download failed: {0}")]
    Fetch(#[source] ComfyUIApiError),

    #[error("Failed to write frame: {0}")]
    Io(#[from] std::io::Error),
}

impl ShotError {
    /// Terminal state the machine stopped in.
    pub fn state(&self) -> ShotState {
        match self {
            Self::Timeout { .. } => ShotState::TimedOut,
            _ => ShotState::BackendError,
        }
    }
}

/// Fresh client identifier: `studioai-<10 hex>`.
pub fn new_client_id() -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!("{CLIENT_ID_PREFIX}{}", &token[..CLIENT_ID_TOKEN_LEN])
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders shots of one job against one backend.
pub struct ShotRenderer<'a, B> {
    backend: &'a B,
    source: &'a WorkflowSource,
    registry: &'a PatchRegistry,
    config: &'a RenderConfig,
    frames_dir: &'a Path,
    poll_interval: Duration,
}

impl<'a, B: GenerationBackend> ShotRenderer<'a, B> {
    pub fn new(
        backend: &'a B,
        source: &'a WorkflowSource,
        registry: &'a PatchRegistry,
        config: &'a RenderConfig,
        frames_dir: &'a Path,
    ) -> Self {
        Self {
            backend,
            source,
            registry,
            config,
            frames_dir,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Build the patched graph for shot `index` (0-based). Returns the
    /// output prefix alongside the graph.
    pub fn prepare(
        &self,
        index: usize,
        prompt: &ShotPrompt,
        reference_image: Option<&str>,
    ) -> (String, GenerationGraph) {
        let prefix = shot_prefix(index, prompt.seed);
        let params = ShotParams {
            positive: &prompt.positive,
            negative: &prompt.negative,
            seed: prompt.seed,
            prefix: &prefix,
            reference_image,
            config: self.config,
        };
        let graph = self.source.build(self.registry, &params);
        (prefix, graph)
    }

    /// Run the full state machine for one shot and return the frame path.
    pub async fn render(
        &self,
        index: usize,
        prompt: &ShotPrompt,
        reference_image: Option<&str>,
    ) -> Result<PathBuf, ShotError> {
        let (prefix, graph) = self.prepare(index, prompt, reference_image);
        let shot = index + 1;
        tracing::debug!(shot, state = %ShotState::Prepared, prefix = %prefix, "Shot graph prepared");

        let client_id = new_client_id();
        let prompt_id = self
            .backend
            .submit(&graph.into_value(), &client_id)
            .await
            .map_err(ShotError::Submit)?;
        tracing::debug!(shot, state = %ShotState::Submitted, prompt_id = %prompt_id, "Shot queued");

        let record = self.wait_for_history(&prompt_id).await?;
        tracing::debug!(shot, state = %ShotState::Completed, prompt_id = %prompt_id, "Shot finished");

        let images = extract_output_images(&record);
        let first = images
            .first()
            .ok_or_else(|| ShotError::NoOutputImages(prompt_id.clone()))?;
        let bytes = self
            .backend
            .fetch_image(first)
            .await
            .map_err(ShotError::Fetch)?;

        let path = self.frames_dir.join(shot_frame_filename(&prefix));
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(shot, state = %ShotState::Fetched, path = %path.display(), "Shot frame stored");
        Ok(path)
    }

    /// Poll the backend until the prompt's history record appears or the
    /// configured timeout elapses.
    async fn wait_for_history(&self, prompt_id: &str) -> Result<Value, ShotError> {
        let timeout_secs = self.config.timeout_secs;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
        tracing::debug!(prompt_id, state = %ShotState::Polling, "Waiting for history");

        while tokio::time::Instant::now() < deadline {
            let record = self
                .backend
                .history(prompt_id)
                .await
                .map_err(|source| ShotError::Poll {
                    prompt_id: prompt_id.to_string(),
                    source,
                })?;
            if let Some(record) = record {
                return Ok(record);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(ShotError::Timeout {
            prompt_id: prompt_id.to_string(),
            timeout_secs,
        })
    }
}
