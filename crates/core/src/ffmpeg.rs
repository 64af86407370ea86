//! FFmpeg command building and invocation.
//!
//! Covers the three encoder jobs of a render: synthesizing a fallback still,
//! synthesizing a title card, and concatenating timed keyframes into an
//! H.264/AAC video with a silent audio track. Availability of the binary is
//! probed once per [`Encoder`]; every operation degrades when it is missing.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::assembly::Keyframe;
use crate::render_config::RenderConfig;

/// Binary used when none is configured.
pub const DEFAULT_FFMPEG_BINARY: &str = "ffmpeg";

/// Canvas colour of title cards.
pub const TITLE_BACKGROUND: &str = "#111827";

/// Title text used when the requested one is blank.
pub const DEFAULT_TITLE_TEXT: &str = "StudioAI";

/// Shortest per-frame duration written to a concat manifest (seconds).
pub const MIN_MANIFEST_DURATION_SECS: f64 = 0.5;

/// Trailing stderr kept in error messages.
const STDERR_TAIL_CHARS: usize = 500;

/// A 1x1 transparent PNG, written when no encoder can synthesize a frame.
pub const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1f, 0x15, 0xc4,
    0x89, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9c, 0x63, 0x60, 0x00, 0x02, 0x00,
    0x00, 0x05, 0x00, 0x01, 0x0d, 0x0a, 0x2d, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4e, 0x44,
    0xae, 0x42, 0x60, 0x82,
];

/// Error type for FFmpeg operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg not available at {}; set FFMPEG_PATH or install ffmpeg", .0.display())]
    Unavailable(PathBuf),

    #[error("ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ffmpeg produced an empty file: {}", .0.display())]
    EmptyOutput(PathBuf),

    #[error("no keyframes to assemble")]
    NoKeyframes,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Output geometry and frame rate of the assembled video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl From<&RenderConfig> for VideoFormat {
    fn from(config: &RenderConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }
}

/// What [`Encoder::encode`] left at the output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOutcome {
    /// A real video file.
    Encoded,
    /// An empty placeholder file; no encoder was available.
    Placeholder,
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Handle to an ffmpeg binary with its probed availability.
#[derive(Debug, Clone)]
pub struct Encoder {
    binary: PathBuf,
    available: bool,
}

impl Encoder {
    /// Probe `binary` by running `<binary> -version`.
    pub async fn detect(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let available = tokio::process::Command::new(&binary)
            .arg("-version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false);
        if !available {
            tracing::warn!(binary = %binary.display(), "ffmpeg not available, frames and video will degrade");
        }
        Self { binary, available }
    }

    /// An encoder known to be missing.
    pub fn unavailable(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            available: false,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Write a solid black still to `output`.
    ///
    /// Falls back to [`PLACEHOLDER_PNG`] when the encoder is missing or
    /// fails to produce a non-empty file.
    pub async fn render_fallback_frame(
        &self,
        output: &Path,
        width: u32,
        height: u32,
    ) -> Result<PathBuf, FfmpegError> {
        if self.available {
            let args = fallback_frame_args(output, width, height);
            match self.run(&args).await {
                Ok(()) if non_empty_file(output).await => return Ok(output.to_path_buf()),
                Ok(()) => {}
                Err(e) => tracing::debug!(error = %e, "fallback frame via ffmpeg failed"),
            }
        }
        tokio::fs::write(output, PLACEHOLDER_PNG).await?;
        Ok(output.to_path_buf())
    }

    /// Write a title card with `text` centred on a dark canvas.
    ///
    /// Degrades to [`Encoder::render_fallback_frame`] on any failure.
    pub async fn render_title_frame(
        &self,
        output: &Path,
        width: u32,
        height: u32,
        text: &str,
    ) -> Result<PathBuf, FfmpegError> {
        if self.available {
            let args = title_frame_args(output, width, height, text);
            match self.run(&args).await {
                Ok(()) if non_empty_file(output).await => return Ok(output.to_path_buf()),
                Ok(()) => {}
                Err(e) => tracing::warn!(error = %e, "title frame failed, using fallback frame"),
            }
        }
        self.render_fallback_frame(output, width, height).await
    }

    /// Concatenate `frames` into a video at `output`.
    ///
    /// The concat manifest is written next to the output with a
    /// `.concat.txt` extension. Without an encoder this either fails
    /// (`require`) or leaves an empty placeholder file.
    pub async fn encode(
        &self,
        frames: &[Keyframe],
        output: &Path,
        format: VideoFormat,
        require: bool,
    ) -> Result<EncodeOutcome, FfmpegError> {
        if frames.is_empty() {
            return Err(FfmpegError::NoKeyframes);
        }
        if !self.available {
            if require {
                return Err(FfmpegError::Unavailable(self.binary.clone()));
            }
            tokio::fs::write(output, b"").await?;
            return Ok(EncodeOutcome::Placeholder);
        }

        let absolute: Vec<Keyframe> = frames
            .iter()
            .map(|f| -> std::io::Result<Keyframe> {
                Ok(Keyframe {
                    path: std::path::absolute(&f.path)?,
                    duration_secs: f.duration_secs,
                })
            })
            .collect::<std::io::Result<_>>()?;

        let manifest = manifest_path(output);
        tokio::fs::write(&manifest, concat_manifest(&absolute)).await?;

        self.run(&encode_args(&manifest, output, format)).await?;
        if !non_empty_file(output).await {
            return Err(FfmpegError::EmptyOutput(output.to_path_buf()));
        }
        Ok(EncodeOutcome::Encoded)
    }

    async fn run(&self, args: &[OsString]) -> Result<(), FfmpegError> {
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Command building
// ---------------------------------------------------------------------------

/// Path of the concat manifest for a given output file.
pub fn manifest_path(output: &Path) -> PathBuf {
    output.with_extension("concat.txt")
}

/// Render an ffmpeg concat-demuxer manifest.
///
/// Each frame contributes a `file` and a `duration` line; the last file is
/// repeated without a duration so its duration is honoured.
pub fn concat_manifest(frames: &[Keyframe]) -> String {
    let mut out = String::new();
    for frame in frames {
        out.push_str(&format!("file '{}'\n", quote_path(&frame.path)));
        out.push_str(&format!(
            "duration {:.3}\n",
            frame.duration_secs.max(MIN_MANIFEST_DURATION_SECS)
        ));
    }
    if let Some(last) = frames.last() {
        out.push_str(&format!("file '{}'\n", quote_path(&last.path)));
    }
    out
}

fn quote_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

/// Arguments for the keyframe-to-video encode.
pub fn encode_args(manifest: &Path, output: &Path, format: VideoFormat) -> Vec<OsString> {
    let VideoFormat { width, height, fps } = format;
    let mut args: Vec<OsString> = ["-y", "-f", "concat", "-safe", "0", "-i"]
        .iter()
        .map(OsString::from)
        .collect();
    args.push(manifest.into());
    args.extend(
        [
            "-f".to_string(),
            "lavfi".to_string(),
            "-i".to_string(),
            "anullsrc=r=44100:cl=stereo".to_string(),
            "-shortest".to_string(),
            "-vf".to_string(),
            format!("fps={fps},scale={width}:{height}:flags=lanczos,format=yuv420p"),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

/// Arguments for a single solid black frame.
pub fn fallback_frame_args(output: &Path, width: u32, height: u32) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-f".into(),
        "lavfi".into(),
        "-i".into(),
        format!("color=c=black:s={width}x{height}").into(),
        "-frames:v".into(),
        "1".into(),
    ];
    args.push(output.into());
    args
}

/// Arguments for a centred white title on the title background.
pub fn title_frame_args(output: &Path, width: u32, height: u32, text: &str) -> Vec<OsString> {
    let text = escape_drawtext(text);
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-f".into(),
        "lavfi".into(),
        "-i".into(),
        format!("color=c={TITLE_BACKGROUND}:s={width}x{height}").into(),
        "-vf".into(),
        format!(
            "drawtext=text='{text}':fontcolor=white:fontsize=42:x=(w-text_w)/2:y=(h-text_h)/2"
        )
        .into(),
        "-frames:v".into(),
        "1".into(),
    ];
    args.push(output.into());
    args
}

/// Escape text for the `drawtext` filter. Blank text becomes
/// [`DEFAULT_TITLE_TEXT`].
pub fn escape_drawtext(text: &str) -> String {
    let text = match text.trim() {
        "" => DEFAULT_TITLE_TEXT,
        trimmed => trimmed,
    };
    text.replace('\\', r"\\")
        .replace(':', r"\:")
        .replace('\'', r"\'")
        .replace('%', r"\%")
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let skip = text.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    text.chars().skip(skip).collect()
}

async fn non_empty_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}
