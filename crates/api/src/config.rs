use std::path::PathBuf;

use studio_comfyui::locator::default_fallback_urls;
use studio_core::ffmpeg::DEFAULT_FFMPEG_BINARY;
use studio_core::prompt::DEFAULT_NEGATIVE_BASE;
use studio_core::render_config::RenderDefaults;
use studio_pipeline::orchestrator::DEFAULT_WORK_DIR_NAME;
use studio_pipeline::shot::DEFAULT_POLL_INTERVAL;
use studio_pipeline::PipelineSettings;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local render box.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8787`).
    pub port: u16,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Key expected in `x-api-key`. `None` disables the check.
    pub api_key: Option<String>,
    /// Settings handed to every render job.
    pub pipeline: PipelineSettings,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                         |
    /// |--------------------------|---------------------------------|
    /// | `HOST`                   | `0.0.0.0`                       |
    /// | `PORT`                   | `8787`                          |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                            |
    /// | `RENDER_API_KEY`         | unset (no check)                |
    /// | `COMFYUI_URL`            | unset (local defaults only)     |
    /// | `COMFYUI_CHECKPOINT`     | unset (first listed checkpoint) |
    /// | `COMFYUI_WORKFLOW_PATH`  | unset (built-in graphs)         |
    /// | `COMFYUI_NEGATIVE_BASE`  | built-in negative baseline      |
    /// | `COMFYUI_FALLBACK_URLS`  | `http://127.0.0.1:8000,http://127.0.0.1:8188` |
    /// | `FFMPEG_PATH`            | `ffmpeg`                        |
    /// | `RENDER_WORK_DIR`        | `<tmp>/studioai-renders`        |
    ///
    /// Render defaults (`COMFYUI_WIDTH`, ...) are read by
    /// [`RenderDefaults::from_lookup`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    ///
    /// Panics on an unparsable `PORT` or `REQUEST_TIMEOUT_SECS`; startup
    /// misconfiguration fails fast.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());

        let port: u16 = var("PORT")
            .unwrap_or_else(|| "8787".into())
            .parse()
            .expect("PORT must be a valid u16");

        let request_timeout_secs: u64 = var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let pipeline = PipelineSettings {
            comfyui_url: var("COMFYUI_URL"),
            fallback_urls: lookup("COMFYUI_FALLBACK_URLS")
                .map(|raw| split_urls(&raw))
                .unwrap_or_else(default_fallback_urls),
            checkpoint: var("COMFYUI_CHECKPOINT"),
            workflow_path: var("COMFYUI_WORKFLOW_PATH").map(PathBuf::from),
            negative_base: lookup("COMFYUI_NEGATIVE_BASE")
                .unwrap_or_else(|| DEFAULT_NEGATIVE_BASE.to_string()),
            ffmpeg_path: PathBuf::from(var("FFMPEG_PATH").unwrap_or_else(|| DEFAULT_FFMPEG_BINARY.into())),
            work_dir: var("RENDER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_WORK_DIR_NAME)),
            render_defaults: RenderDefaults::from_lookup(&lookup),
            poll_interval: DEFAULT_POLL_INTERVAL,
        };

        Self {
            host,
            port,
            request_timeout_secs,
            api_key: var("RENDER_API_KEY"),
            pipeline,
        }
    }
}

/// Comma-separated URL list; blank entries are dropped.
fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}
