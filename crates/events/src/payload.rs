//! JSON bodies of the outbound callbacks.

use serde::{Deserialize, Serialize};

/// Mode reported for every render produced by this service.
pub const RENDER_MODE: &str = "storyboard_keyframes";

/// Body of `POST {base}/progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub episode_id: String,
    pub job_id: String,
    pub progress_percent: u8,
    pub current_step: String,
}

/// Body of `POST {base}/complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub episode_id: String,
    pub job_id: String,
    /// Local path of the produced video file.
    pub output_url: String,
    pub duration_seconds: u64,
    pub metadata: CompletionMetadata,
}

/// Summary of a finished render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMetadata {
    pub mode: String,
    /// Keyframes in the video, title frames included.
    pub shot_count: usize,
    pub comfyui_url: String,
    pub intro_enabled: bool,
    pub outro_enabled: bool,
    pub tts_enabled: bool,
    pub music_enabled: bool,
    pub sfx_enabled: bool,
    pub voice_cast_count: usize,
}

/// Body of `POST {base}/failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPayload {
    pub episode_id: String,
    pub job_id: String,
    pub error_message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn complete_payload_shape() {
        let payload = CompletePayload {
            episode_id: "ep-1".into(),
            job_id: "job-1".into(),
            output_url: "/tmp/out.mp4".into(),
            duration_seconds: 12,
            metadata: CompletionMetadata {
                mode: RENDER_MODE.into(),
                shot_count: 3,
                comfyui_url: "http://127.0.0.1:8188".into(),
                intro_enabled: true,
                outro_enabled: false,
                tts_enabled: true,
                music_enabled: true,
                sfx_enabled: false,
                voice_cast_count: 1,
            },
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["metadata"]["mode"], json!("storyboard_keyframes"));
        assert_eq!(value["duration_seconds"], json!(12));
        assert_eq!(value["metadata"]["voice_cast_count"], json!(1));
    }
}
