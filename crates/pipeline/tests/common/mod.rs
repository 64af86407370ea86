#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use studio_comfyui::api::ComfyUIApiError;
use studio_comfyui::history::OutputImage;
use studio_core::episode::{EpisodeRequest, Shot};
use studio_core::render_config::RenderDefaults;
use studio_events::payload::CompletionMetadata;
use studio_pipeline::{GenerationBackend, JobPlan, PipelineSettings, ProgressSink};

/// Backend that completes every submission except the ones listed in
/// `stalled` (1-based submission numbers), which never appear in history.
#[derive(Default)]
pub struct MockBackend {
    pub stalled: HashSet<usize>,
    pub submitted: Mutex<Vec<Value>>,
    pub uploads: AtomicUsize,
}

impl MockBackend {
    pub fn stalling(submissions: &[usize]) -> Self {
        Self {
            stalled: submissions.iter().copied().collect(),
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<Value> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }
}

impl GenerationBackend for MockBackend {
    fn base_url(&self) -> &str {
        "http://mock-comfyui"
    }

    async fn submit(&self, graph: &Value, _client_id: &str) -> Result<String, ComfyUIApiError> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push(graph.clone());
        Ok(format!("prompt-{}", submitted.len()))
    }

    async fn history(&self, prompt_id: &str) -> Result<Option<Value>, ComfyUIApiError> {
        let n: usize = prompt_id.trim_start_matches("prompt-").parse().unwrap_or(0);
        if self.stalled.contains(&n) {
            return Ok(None);
        }
        Ok(Some(json!({
            "outputs": { "9": { "images": [{ "filename": format!("{prompt_id}.png"), "subfolder": "", "type": "output" }] } }
        })))
    }

    async fn upload_image(&self, path: &Path) -> Result<String, ComfyUIApiError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "uploaded-{}",
            path.file_name().unwrap().to_string_lossy()
        ))
    }

    async fn fetch_image(&self, image: &OutputImage) -> Result<Vec<u8>, ComfyUIApiError> {
        Ok(format!("image:{}", image.filename).into_bytes())
    }

    async fn checkpoint_names(&self) -> Result<Vec<String>, ComfyUIApiError> {
        Ok(vec!["dreamshaper.safetensors".to_string()])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Progress(u8, String),
    Complete {
        output_url: String,
        duration_seconds: u64,
        metadata: CompletionMetadata,
    },
    Failed(String),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Failed(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn completion(&self) -> Option<(String, u64, CompletionMetadata)> {
        self.events().into_iter().find_map(|e| match e {
            SinkEvent::Complete {
                output_url,
                duration_seconds,
                metadata,
            } => Some((output_url, duration_seconds, metadata)),
            _ => None,
        })
    }

    pub fn steps(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Progress(_, step) => Some(step),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    async fn progress(&self, percent: u8, step: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress(percent, step.to_string()));
    }

    async fn complete(&self, output_url: &str, duration_seconds: u64, metadata: CompletionMetadata) {
        self.events.lock().unwrap().push(SinkEvent::Complete {
            output_url: output_url.to_string(),
            duration_seconds,
            metadata,
        });
    }

    async fn failed(&self, error_message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Failed(error_message.to_string()));
    }
}

/// Settings with no encoder and a fast poll loop.
pub fn test_settings(work_dir: &Path) -> PipelineSettings {
    PipelineSettings {
        ffmpeg_path: "/nonexistent/ffmpeg".into(),
        work_dir: work_dir.to_path_buf(),
        poll_interval: Duration::from_millis(10),
        ..PipelineSettings::default()
    }
}

pub fn shot(n: i64, positive: &str) -> Shot {
    Shot {
        scene: 1,
        shot_index: n,
        prompt_positive: positive.to_string(),
        ..Shot::default()
    }
}

pub fn episode(storyboard: Vec<Shot>, extra: Value) -> EpisodeRequest {
    let mut base = json!({
        "episode_id": "ep-42",
        "job_id": "job-7",
        "episode_number": 3,
        "title": "The Lost Kite",
        "style": "pixar style",
        "callback_url": "http://callbacks.invalid/render",
        "callback_key": "secret"
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    let mut request: EpisodeRequest = serde_json::from_value(base).unwrap();
    request.storyboard = storyboard;
    request
}

/// Plan with a one-second shot timeout.
pub fn plan(request: EpisodeRequest) -> JobPlan {
    let mut plan = JobPlan::new(request, &RenderDefaults::default());
    plan.config.timeout_secs = 1;
    plan
}
