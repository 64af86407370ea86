//! Render configuration resolution.
//!
//! A job's [`RenderConfig`] is resolved once from the request's `render`
//! option map layered over process-wide [`RenderDefaults`]. Resolution never
//! fails: malformed overrides fall back to the default, and every numeric
//! field is clamped into its allowed range regardless of where it came from.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::coerce::{
    parse_bool, parse_bool_str, parse_float, parse_float_str, parse_int, parse_int_str,
    parse_string,
};

// ---------------------------------------------------------------------------
// Built-in defaults
// ---------------------------------------------------------------------------

pub const DEFAULT_WIDTH: u32 = 832;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const DEFAULT_STEPS: u32 = 24;
pub const DEFAULT_CFG: f64 = 7.0;
pub const DEFAULT_DENOISE: f64 = 0.55;
pub const DEFAULT_FPS: u32 = 12;
pub const DEFAULT_SAMPLER: &str = "euler";
pub const DEFAULT_SCHEDULER: &str = "normal";
pub const DEFAULT_TIMEOUT_SECS: u64 = 240;
pub const DEFAULT_REFERENCE_STRENGTH: f64 = 0.65;

// ---------------------------------------------------------------------------
// Clamps
// ---------------------------------------------------------------------------

pub const MIN_DIMENSION: u32 = 256;
pub const MIN_STEPS: u32 = 6;
pub const MIN_CFG: f64 = 1.0;
pub const MIN_DENOISE: f64 = 0.1;
pub const MAX_DENOISE: f64 = 1.0;
pub const MIN_FPS: u32 = 6;
pub const MIN_TIMEOUT_SECS: u64 = 30;
pub const MIN_REFERENCE_STRENGTH: f64 = 0.0;
pub const MAX_REFERENCE_STRENGTH: f64 = 1.0;

// ---------------------------------------------------------------------------
// Override keys
// ---------------------------------------------------------------------------

pub const KEY_WIDTH: &str = "width";
pub const KEY_HEIGHT: &str = "height";
pub const KEY_STEPS: &str = "steps";
pub const KEY_CFG: &str = "cfg";
pub const KEY_DENOISE: &str = "denoise";
pub const KEY_FPS: &str = "fps";
pub const KEY_SAMPLER: &str = "sampler";
pub const KEY_SCHEDULER: &str = "scheduler";
pub const KEY_TIMEOUT_SECONDS: &str = "timeout_seconds";
pub const KEY_REFERENCE_STRENGTH: &str = "reference_strength";
pub const KEY_FAIL_ON_SHOT_ERROR: &str = "fail_on_shot_error";
pub const KEY_REQUIRE_FFMPEG: &str = "require_ffmpeg";
/// Accepted alias of [`KEY_REQUIRE_FFMPEG`].
pub const KEY_REQUIRE_ENCODER: &str = "require_encoder";

/// Process-wide render defaults, normally sourced from the environment.
///
/// Values are stored already coerced; clamping happens in
/// [`RenderConfig::resolve`] so that an out-of-range environment value is
/// treated exactly like an out-of-range request override.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderDefaults {
    pub width: i64,
    pub height: i64,
    pub steps: i64,
    pub cfg: f64,
    pub denoise: f64,
    pub fps: i64,
    pub sampler: String,
    pub scheduler: String,
    pub timeout_secs: i64,
    pub reference_strength: f64,
    pub fail_on_shot_error: bool,
    pub require_encoder: bool,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            width: i64::from(DEFAULT_WIDTH),
            height: i64::from(DEFAULT_HEIGHT),
            steps: i64::from(DEFAULT_STEPS),
            cfg: DEFAULT_CFG,
            denoise: DEFAULT_DENOISE,
            fps: i64::from(DEFAULT_FPS),
            sampler: DEFAULT_SAMPLER.to_string(),
            scheduler: DEFAULT_SCHEDULER.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS as i64,
            reference_strength: DEFAULT_REFERENCE_STRENGTH,
            fail_on_shot_error: false,
            require_encoder: false,
        }
    }
}

impl RenderDefaults {
    /// Load defaults from environment variables.
    ///
    /// | Env Var                       | Default  |
    /// |-------------------------------|----------|
    /// | `COMFYUI_WIDTH`               | `832`    |
    /// | `COMFYUI_HEIGHT`              | `480`    |
    /// | `COMFYUI_STEPS`               | `24`     |
    /// | `COMFYUI_CFG`                 | `7.0`    |
    /// | `COMFYUI_DENOISE`             | `0.55`   |
    /// | `COMFYUI_FPS`                 | `12`     |
    /// | `COMFYUI_SAMPLER`             | `euler`  |
    /// | `COMFYUI_SCHEDULER`           | `normal` |
    /// | `COMFYUI_TIMEOUT_SECONDS`     | `240`    |
    /// | `COMFYUI_REFERENCE_STRENGTH`  | `0.65`   |
    /// | `RENDER_FAIL_ON_SHOT_ERROR`   | `false`  |
    /// | `RENDER_REQUIRE_FFMPEG`       | `false`  |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build defaults from an arbitrary key lookup. Unset or malformed
    /// entries keep the built-in default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Self::default();
        let int = |key: &str, fallback: i64| {
            lookup(key).map_or(fallback, |raw| parse_int_str(&raw, fallback))
        };
        let float = |key: &str, fallback: f64| {
            lookup(key).map_or(fallback, |raw| parse_float_str(&raw, fallback))
        };
        let flag = |key: &str, fallback: bool| {
            lookup(key).map_or(fallback, |raw| parse_bool_str(&raw, fallback))
        };
        let text = |key: &str, fallback: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };

        Self {
            width: int("COMFYUI_WIDTH", base.width),
            height: int("COMFYUI_HEIGHT", base.height),
            steps: int("COMFYUI_STEPS", base.steps),
            cfg: float("COMFYUI_CFG", base.cfg),
            denoise: float("COMFYUI_DENOISE", base.denoise),
            fps: int("COMFYUI_FPS", base.fps),
            sampler: text("COMFYUI_SAMPLER", &base.sampler),
            scheduler: text("COMFYUI_SCHEDULER", &base.scheduler),
            timeout_secs: int("COMFYUI_TIMEOUT_SECONDS", base.timeout_secs),
            reference_strength: float("COMFYUI_REFERENCE_STRENGTH", base.reference_strength),
            fail_on_shot_error: flag("RENDER_FAIL_ON_SHOT_ERROR", base.fail_on_shot_error),
            require_encoder: flag("RENDER_REQUIRE_FFMPEG", base.require_encoder),
        }
    }
}

/// Fully resolved, immutable render configuration for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg: f64,
    pub denoise: f64,
    pub fps: u32,
    pub sampler: String,
    pub scheduler: String,
    pub timeout_secs: u64,
    pub reference_strength: f64,
    pub fail_on_shot_error: bool,
    pub require_encoder: bool,
}

impl RenderConfig {
    /// Resolve the configuration from request overrides and defaults.
    ///
    /// Each recognised key takes the override when it is present and
    /// coercible, otherwise the default. Floors and ceilings are applied
    /// last, so they hold for both sources.
    pub fn resolve(overrides: &Map<String, Value>, defaults: &RenderDefaults) -> Self {
        let get = |key: &str| overrides.get(key).filter(|v| !v.is_null());

        let width = parse_int(get(KEY_WIDTH), defaults.width);
        let height = parse_int(get(KEY_HEIGHT), defaults.height);
        let steps = parse_int(get(KEY_STEPS), defaults.steps);
        let cfg = parse_float(get(KEY_CFG), defaults.cfg);
        let denoise = parse_float(get(KEY_DENOISE), defaults.denoise);
        let fps = parse_int(get(KEY_FPS), defaults.fps);
        let timeout_secs = parse_int(get(KEY_TIMEOUT_SECONDS), defaults.timeout_secs);
        let reference_strength =
            parse_float(get(KEY_REFERENCE_STRENGTH), defaults.reference_strength);
        let require_override = get(KEY_REQUIRE_FFMPEG).or_else(|| get(KEY_REQUIRE_ENCODER));

        Self {
            width: floor_u32(width, MIN_DIMENSION),
            height: floor_u32(height, MIN_DIMENSION),
            steps: floor_u32(steps, MIN_STEPS),
            cfg: cfg.max(MIN_CFG),
            denoise: denoise.clamp(MIN_DENOISE, MAX_DENOISE),
            fps: floor_u32(fps, MIN_FPS),
            sampler: parse_string(get(KEY_SAMPLER), &defaults.sampler),
            scheduler: parse_string(get(KEY_SCHEDULER), &defaults.scheduler),
            timeout_secs: timeout_secs.max(MIN_TIMEOUT_SECS as i64) as u64,
            reference_strength: reference_strength
                .clamp(MIN_REFERENCE_STRENGTH, MAX_REFERENCE_STRENGTH),
            fail_on_shot_error: parse_bool(
                get(KEY_FAIL_ON_SHOT_ERROR),
                defaults.fail_on_shot_error,
            ),
            require_encoder: parse_bool(require_override, defaults.require_encoder),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self::resolve(&Map::new(), &RenderDefaults::default())
    }
}

/// Clamp an integer into `[floor, u32::MAX]`.
fn floor_u32(value: i64, floor: u32) -> u32 {
    value.clamp(i64::from(floor), i64::from(u32::MAX)) as u32
}
