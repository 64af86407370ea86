//! Keyframe assembly: fallback and title frames plus the final encode.

use std::path::PathBuf;

use studio_core::assembly::{Keyframe, KeyframeSequence};
use studio_core::ffmpeg::{EncodeOutcome, Encoder, FfmpegError, VideoFormat};
use studio_core::naming::{
    fallback_frame_filename, output_video_filename, INTRO_TITLE_FILENAME, OUTRO_TITLE_FILENAME,
};
use studio_core::production::ProductionOptions;
use studio_core::render_config::RenderConfig;

use crate::workspace::JobWorkspace;

const OUTPUT_TOKEN_LEN: usize = 8;

/// The encoded episode.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledVideo {
    pub path: PathBuf,
    pub outcome: EncodeOutcome,
    /// Keyframes in the video, title frames included.
    pub keyframe_count: usize,
    pub duration_seconds: u64,
}

pub struct Assembler<'a> {
    encoder: &'a Encoder,
    config: &'a RenderConfig,
    workspace: &'a JobWorkspace,
}

impl<'a> Assembler<'a> {
    pub fn new(encoder: &'a Encoder, config: &'a RenderConfig, workspace: &'a JobWorkspace) -> Self {
        Self {
            encoder,
            config,
            workspace,
        }
    }

    /// Placeholder still for shot `index` (0-based).
    pub async fn fallback_frame(&self, index: usize) -> Result<PathBuf, FfmpegError> {
        let path = self.workspace.frame_path(&fallback_frame_filename(index));
        self.encoder
            .render_fallback_frame(&path, self.config.width, self.config.height)
            .await
    }

    /// Bracket `sequence` with the enabled title frames.
    pub async fn add_titles(
        &self,
        sequence: &mut KeyframeSequence,
        production: &ProductionOptions,
    ) -> Result<(), FfmpegError> {
        if production.intro_enabled {
            let path = self
                .title_frame(INTRO_TITLE_FILENAME, &production.intro_text)
                .await?;
            sequence.prepend_intro(Keyframe::new(path, production.intro_duration_secs));
        }
        if production.outro_enabled {
            let path = self
                .title_frame(OUTRO_TITLE_FILENAME, &production.outro_text)
                .await?;
            sequence.append_outro(Keyframe::new(path, production.outro_duration_secs));
        }
        Ok(())
    }

    /// Encode `sequence` into `<episode>-<token>.mp4` in the job directory.
    pub async fn assemble(
        &self,
        sequence: &KeyframeSequence,
        episode_id: &str,
    ) -> Result<AssembledVideo, FfmpegError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let path = self
            .workspace
            .output_path(&output_video_filename(episode_id, &token[..OUTPUT_TOKEN_LEN]));
        let outcome = self
            .encoder
            .encode(
                sequence.frames(),
                &path,
                VideoFormat::from(self.config),
                self.config.require_encoder,
            )
            .await?;
        tracing::info!(
            path = %path.display(),
            frames = sequence.len(),
            placeholder = outcome == EncodeOutcome::Placeholder,
            "Episode video assembled"
        );
        Ok(AssembledVideo {
            path,
            outcome,
            keyframe_count: sequence.len(),
            duration_seconds: sequence.reported_duration_secs(),
        })
    }

    async fn title_frame(&self, file_name: &str, text: &str) -> Result<PathBuf, FfmpegError> {
        let path = self.workspace.frame_path(file_name);
        self.encoder
            .render_title_frame(&path, self.config.width, self.config.height, text)
            .await
    }
}
