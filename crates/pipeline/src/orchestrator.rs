//! Render job orchestration.
//!
//! A job locates a backend, renders every shot in storyboard order,
//! brackets the frames with optional titles and encodes the video. Every
//! unrecovered error is reported exactly once through
//! [`ProgressSink::failed`]; `complete` is sent only for a finished video.

use std::path::PathBuf;
use std::time::Duration;

use tracing::Instrument;

use studio_comfyui::locator::{candidate_urls, default_fallback_urls, locate};
use studio_core::assembly::KeyframeSequence;
use studio_core::emotion::pick_emotion_reference;
use studio_core::episode::EpisodeRequest;
use studio_core::ffmpeg::{EncodeOutcome, Encoder, FfmpegError, DEFAULT_FFMPEG_BINARY};
use studio_core::production::ProductionOptions;
use studio_core::progress::{
    backend_connected_step, shot_progress, shot_rendered_step, PROGRESS_ASSEMBLING,
    PROGRESS_BACKEND_CONNECTED, PROGRESS_MUSIC_STUB, PROGRESS_QUEUED, PROGRESS_SFX_STUB,
    PROGRESS_VOICE_STUB, STEP_ASSEMBLING, STEP_MUSIC_STUB, STEP_QUEUED, STEP_SFX_STUB,
    STEP_VOICE_STUB,
};
use studio_core::prompt::{build_shot_prompt, ShotPrompt, DEFAULT_NEGATIVE_BASE};
use studio_core::render_config::{RenderConfig, RenderDefaults};
use studio_core::workflow::{load_template, PatchRegistry, WorkflowError, WorkflowSource};
use studio_events::payload::{CompletionMetadata, RENDER_MODE};
use studio_events::CallbackClient;

use crate::assembler::Assembler;
use crate::backend::{resolve_checkpoint, GenerationBackend};
use crate::reference::ReferenceCache;
use crate::shot::{ShotError, ShotRenderer, DEFAULT_POLL_INTERVAL};
use crate::sink::ProgressSink;
use crate::workspace::JobWorkspace;

/// Directory under the system temp dir holding per-job working dirs.
pub const DEFAULT_WORK_DIR_NAME: &str = "studioai-renders";

// ---------------------------------------------------------------------------
// Settings and plan
// ---------------------------------------------------------------------------

/// Process-wide settings shared by every job.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Preferred backend URL, probed before the local defaults.
    pub comfyui_url: Option<String>,
    /// Local URLs probed after `comfyui_url`.
    pub fallback_urls: Vec<String>,
    /// Forced checkpoint for built-in graphs.
    pub checkpoint: Option<String>,
    pub workflow_path: Option<PathBuf>,
    pub negative_base: String,
    pub ffmpeg_path: PathBuf,
    pub work_dir: PathBuf,
    pub render_defaults: RenderDefaults,
    pub poll_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            comfyui_url: None,
            fallback_urls: default_fallback_urls(),
            checkpoint: None,
            workflow_path: None,
            negative_base: DEFAULT_NEGATIVE_BASE.to_string(),
            ffmpeg_path: PathBuf::from(DEFAULT_FFMPEG_BINARY),
            work_dir: std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME),
            render_defaults: RenderDefaults::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// An accepted request with its options resolved.
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub request: EpisodeRequest,
    pub config: RenderConfig,
    pub production: ProductionOptions,
}

impl JobPlan {
    pub fn new(request: EpisodeRequest, defaults: &RenderDefaults) -> Self {
        let config = RenderConfig::resolve(&request.render, defaults);
        let production = ProductionOptions::resolve(&request.production, &request.audio, &request.title);
        Self {
            request,
            config,
            production,
        }
    }
}

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub video: PathBuf,
    pub outcome: EncodeOutcome,
    pub duration_seconds: u64,
    pub metadata: CompletionMetadata,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("ComfyUI is not reachable on {}", .candidates.join(", "))]
    BackendUnreachable { candidates: Vec<String> },

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("shot {index} failed: {source}")]
    Shot {
        /// 1-based position in the storyboard.
        index: usize,
        #[source]
        source: ShotError,
    },

    #[error("Fallback frame failed: {0}")]
    Frame(#[source] FfmpegError),

    #[error("Video assembly failed: {0}")]
    Assembly(#[source] FfmpegError),

    #[error("Job workspace error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run one accepted request end to end, reporting through its callbacks.
pub async fn run_render_job(http: reqwest::Client, settings: &PipelineSettings, request: EpisodeRequest) {
    let span = tracing::info_span!(
        "render_job",
        episode_id = %request.episode_id,
        job_id = %request.job_id
    );
    run_located(http, settings, request).instrument(span).await;
}

async fn run_located(http: reqwest::Client, settings: &PipelineSettings, request: EpisodeRequest) {
    let sink = CallbackClient::for_job(
        http.clone(),
        &request.callback_url,
        &request.callback_key,
        &request.episode_id,
        &request.job_id,
    );
    let plan = JobPlan::new(request, &settings.render_defaults);

    let candidates = candidate_urls(None, settings.comfyui_url.as_deref(), &settings.fallback_urls);
    let located = locate(&http, &candidates).await;

    sink.progress(PROGRESS_QUEUED, STEP_QUEUED).await;

    let Some(located) = located else {
        let err = PipelineError::BackendUnreachable { candidates };
        tracing::error!(error = %err, "Render job failed");
        sink.failed(&err.to_string()).await;
        return;
    };

    if let Err(e) = run_job(&plan, settings, &http, &located.api, located.version(), &sink).await {
        tracing::debug!(error = %e, "Render job ended with a reported failure");
    }
}

/// Execute a planned job against a located backend and report the outcome
/// through `sink` exactly once.
pub async fn run_job<B, S>(
    plan: &JobPlan,
    settings: &PipelineSettings,
    http: &reqwest::Client,
    backend: &B,
    version: Option<&str>,
    sink: &S,
) -> Result<JobOutput, PipelineError>
where
    B: GenerationBackend,
    S: ProgressSink,
{
    let episode_id = plan.request.episode_id.as_str();
    let job_id = plan.request.job_id.as_str();

    match execute(plan, settings, http, backend, version, sink).await {
        Ok(output) => {
            tracing::info!(
                episode_id,
                job_id,
                video = %output.video.display(),
                duration_seconds = output.duration_seconds,
                "Render job complete"
            );
            sink.complete(
                &output.video.to_string_lossy(),
                output.duration_seconds,
                output.metadata.clone(),
            )
            .await;
            Ok(output)
        }
        Err(e) => {
            tracing::error!(episode_id, job_id, error = %e, "Render job failed");
            sink.failed(&e.to_string()).await;
            Err(e)
        }
    }
}

/// The job body. Sends progress but never the outcome callbacks.
pub async fn execute<B, S>(
    plan: &JobPlan,
    settings: &PipelineSettings,
    http: &reqwest::Client,
    backend: &B,
    version: Option<&str>,
    sink: &S,
) -> Result<JobOutput, PipelineError>
where
    B: GenerationBackend,
    S: ProgressSink,
{
    let request = &plan.request;
    let config = &plan.config;

    sink.progress(PROGRESS_BACKEND_CONNECTED, &backend_connected_step(version))
        .await;

    let workspace = JobWorkspace::create(&settings.work_dir, &request.episode_id, &request.job_id).await?;

    let template = settings
        .workflow_path
        .as_deref()
        .map(load_template)
        .transpose()?;
    let checkpoint = match template {
        Some(_) => None,
        None => resolve_checkpoint(backend, settings.checkpoint.as_deref()).await,
    };
    let source = WorkflowSource::resolve(template, checkpoint)?;

    let registry = PatchRegistry::standard();
    let encoder = Encoder::detect(&settings.ffmpeg_path).await;
    let references = ReferenceCache::new(http.clone(), workspace.refs_dir());
    let renderer = ShotRenderer::new(backend, &source, &registry, config, workspace.frames_dir())
        .with_poll_interval(settings.poll_interval);
    let assembler = Assembler::new(&encoder, config, &workspace);

    let storyboard = request.effective_storyboard();
    let total = storyboard.len();
    let primary = request.primary_character();
    let mut sequence = KeyframeSequence::new();

    tracing::info!(
        episode_id = %request.episode_id,
        job_id = %request.job_id,
        shots = total,
        template = source.is_template(),
        "Rendering storyboard"
    );

    for (index, shot) in storyboard.iter().enumerate() {
        let focus = request.focus_character(shot, primary);
        let reference = pick_emotion_reference(focus, shot);
        let prompt = build_shot_prompt(request, shot, focus, config, &settings.negative_base, &reference);

        let frame = match render_shot(&renderer, &references, backend, index, &prompt).await {
            Ok(path) => path,
            Err(source) if config.fail_on_shot_error => {
                return Err(PipelineError::Shot {
                    index: index + 1,
                    source,
                });
            }
            Err(e) => {
                tracing::warn!(
                    shot = index + 1,
                    state = %e.state(),
                    error = %e,
                    "Shot failed, using fallback frame"
                );
                assembler
                    .fallback_frame(index)
                    .await
                    .map_err(PipelineError::Frame)?
            }
        };

        sequence.push(frame, shot.keyframe_duration());
        sink.progress(
            shot_progress(index + 1, total),
            &shot_rendered_step(index + 1, total),
        )
        .await;
    }

    assembler
        .add_titles(&mut sequence, &plan.production)
        .await
        .map_err(PipelineError::Frame)?;

    let production = &plan.production;
    if production.tts_enabled {
        sink.progress(PROGRESS_VOICE_STUB, STEP_VOICE_STUB).await;
    }
    if production.music_enabled {
        sink.progress(PROGRESS_MUSIC_STUB, STEP_MUSIC_STUB).await;
    }
    if production.sfx_enabled {
        sink.progress(PROGRESS_SFX_STUB, STEP_SFX_STUB).await;
    }
    sink.progress(PROGRESS_ASSEMBLING, STEP_ASSEMBLING).await;

    let video = assembler
        .assemble(&sequence, &request.episode_id)
        .await
        .map_err(PipelineError::Assembly)?;

    let metadata = CompletionMetadata {
        mode: RENDER_MODE.to_string(),
        shot_count: video.keyframe_count,
        comfyui_url: backend.base_url().to_string(),
        intro_enabled: production.intro_enabled,
        outro_enabled: production.outro_enabled,
        tts_enabled: production.tts_enabled,
        music_enabled: production.music_enabled,
        sfx_enabled: production.sfx_enabled,
        voice_cast_count: request.voice_cast_count(),
    };

    Ok(JobOutput {
        video: video.path,
        outcome: video.outcome,
        duration_seconds: video.duration_seconds,
        metadata,
    })
}

/// Resolve the shot's reference on the backend, then render it.
async fn render_shot<B: GenerationBackend>(
    renderer: &ShotRenderer<'_, B>,
    references: &ReferenceCache,
    backend: &B,
    index: usize,
    prompt: &ShotPrompt,
) -> Result<PathBuf, ShotError> {
    let reference_image = match prompt.reference_url.as_deref() {
        Some(url) => Some(references.resolve_for_backend(backend, url).await?),
        None => None,
    };
    renderer.render(index, prompt, reference_image.as_deref()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{Behavior, FakeBackend};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Mutex;
    use studio_core::episode::Shot;

    #[derive(Default)]
    struct Recorded {
        events: Mutex<Vec<String>>,
    }

    impl ProgressSink for Recorded {
        async fn progress(&self, percent: u8, step: &str) {
            self.events.lock().unwrap().push(format!("{percent}:{step}"));
        }

        async fn complete(&self, _output_url: &str, duration_seconds: u64, _metadata: CompletionMetadata) {
            self.events.lock().unwrap().push(format!("complete:{duration_seconds}"));
        }

        async fn failed(&self, error_message: &str) {
            self.events.lock().unwrap().push(format!("failed:{error_message}"));
        }
    }

    fn settings(work_dir: &std::path::Path) -> PipelineSettings {
        PipelineSettings {
            checkpoint: Some("sd15.safetensors".into()),
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            work_dir: work_dir.to_path_buf(),
            poll_interval: Duration::from_millis(1),
            ..PipelineSettings::default()
        }
    }

    fn request(shots: usize) -> EpisodeRequest {
        let storyboard = (1..=shots)
            .map(|i| Shot {
                shot_index: i as i64,
                prompt_positive: format!("shot {i}"),
                ..Shot::default()
            })
            .collect();
        let mut request: EpisodeRequest = serde_json::from_value(json!({
            "episode_id": "ep-1",
            "job_id": "job-1",
            "callback_url": "http://callbacks.invalid",
            "callback_key": "secret",
            "title": "Pilot",
            "audio": { "tts_enabled": false, "background_music_enabled": false, "sfx_enabled": false }
        }))
        .unwrap();
        request.storyboard = storyboard;
        request
    }

    #[test]
    fn plan_resolves_render_and_production_options() {
        let mut req = request(1);
        req.render = json!({ "denoise": 5.0, "fail_on_shot_error": "yes" })
            .as_object()
            .cloned()
            .unwrap();
        let plan = JobPlan::new(req, &RenderDefaults::default());
        assert_eq!(plan.config.denoise, 1.0);
        assert!(plan.config.fail_on_shot_error);
        assert_eq!(plan.production.intro_text, "Pilot");
        assert!(!plan.production.tts_enabled);
    }

    #[tokio::test]
    async fn progress_milestones_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FakeBackend::default();
        let sink = Recorded::default();
        let plan = JobPlan::new(request(2), &RenderDefaults::default());

        let output = run_job(&plan, &settings(tmp.path()), &reqwest::Client::new(), &backend, Some("0.3.1"), &sink)
            .await
            .unwrap();

        assert_eq!(output.outcome, EncodeOutcome::Placeholder);
        assert_eq!(output.metadata.shot_count, 2);
        assert_eq!(output.metadata.comfyui_url, "http://fake-backend");
        assert_eq!(
            *sink.events.lock().unwrap(),
            [
                "12:comfyui_connected:0.3.1",
                "43:rendered_shot_1_of_2",
                "75:rendered_shot_2_of_2",
                "85:assembling_video",
                "complete:8",
            ]
        );
    }

    #[tokio::test]
    async fn strict_mode_aborts_with_one_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FakeBackend::with_behaviors(vec![Behavior::Complete, Behavior::RejectSubmit]);
        let sink = Recorded::default();
        let mut plan = JobPlan::new(request(3), &RenderDefaults::default());
        plan.config.fail_on_shot_error = true;

        let err = run_job(&plan, &settings(tmp.path()), &reqwest::Client::new(), &backend, None, &sink)
            .await
            .unwrap_err();

        assert_matches!(err, PipelineError::Shot { index: 2, .. });
        let events = sink.events.lock().unwrap();
        let failures: Vec<_> = events.iter().filter(|e| e.starts_with("failed:")).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("failed:shot 2 failed:"), "{}", failures[0]);
        assert!(!events.iter().any(|e| e.starts_with("complete")));
        assert_eq!(backend.submitted.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_checkpoint_fails_before_rendering() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = FakeBackend::default();
        let sink = Recorded::default();
        let plan = JobPlan::new(request(1), &RenderDefaults::default());
        let settings = PipelineSettings {
            checkpoint: None,
            ..settings(tmp.path())
        };

        let err = run_job(&plan, &settings, &reqwest::Client::new(), &backend, None, &sink)
            .await
            .unwrap_err();
        assert_matches!(err, PipelineError::Workflow(WorkflowError::MissingCheckpoint));
        assert!(backend.submitted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_backend_reports_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::any())
            .respond_with(wiremock::ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut req = request(1);
        req.callback_url = server.uri();
        let settings = PipelineSettings {
            comfyui_url: Some("http://127.0.0.1:9".into()),
            fallback_urls: Vec::new(),
            ..settings(tmp.path())
        };
        run_render_job(reqwest::Client::new(), &settings, req).await;

        let received = server.received_requests().await.unwrap();
        let paths: Vec<_> = received.iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(paths, ["/progress", "/failed"]);
        let body: serde_json::Value = serde_json::from_slice(&received[1].body).unwrap();
        let message = body["error_message"].as_str().unwrap();
        assert_eq!(message, "ComfyUI is not reachable on http://127.0.0.1:9");
    }

    #[tokio::test]
    async fn located_backend_failure_is_reported_once() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let tmp = tempfile::tempdir().unwrap();
        let comfy = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/system_stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "system": {} })))
            .mount(&comfy)
            .await;
        Mock::given(method("GET"))
            .and(path("/object_info/CheckpointLoaderSimple"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&comfy)
            .await;
        let callbacks = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&callbacks)
            .await;

        let mut req = request(1);
        req.callback_url = callbacks.uri();
        let settings = PipelineSettings {
            comfyui_url: Some(comfy.uri()),
            fallback_urls: Vec::new(),
            checkpoint: None,
            ..settings(tmp.path())
        };
        run_render_job(reqwest::Client::new(), &settings, req).await;

        let received = callbacks.received_requests().await.unwrap();
        let paths: Vec<_> = received.iter().map(|r| r.url.path().to_string()).collect();
        assert_eq!(paths, ["/progress", "/progress", "/failed"]);
        let body: serde_json::Value = serde_json::from_slice(&received[2].body).unwrap();
        assert_eq!(body["error_message"], WorkflowError::MissingCheckpoint.to_string());
        assert!(comfy
            .received_requests()
            .await
            .unwrap()
            .iter()
            .all(|r| r.url.path() != "/prompt"));
    }
}
