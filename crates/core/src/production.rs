//! Production and audio options.
//!
//! Resolved once per job from the request's free-form `production` and
//! `audio` maps. These toggle title frames and the audio stage reports; no
//! audio is synthesized.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::coerce::{parse_bool, parse_int, parse_string};

/// Title-frame duration when none is configured (seconds).
pub const DEFAULT_TITLE_DURATION_SECS: i64 = 4;

/// Minimum title-frame duration (seconds).
pub const MIN_TITLE_DURATION_SECS: f64 = 1.0;

/// Intro text used when neither the options nor the episode provide one.
pub const DEFAULT_INTRO_TEXT: &str = "Episode";

pub const DEFAULT_OUTRO_TEXT: &str = "Thanks for watching";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductionOptions {
    pub intro_enabled: bool,
    pub outro_enabled: bool,
    pub intro_text: String,
    pub outro_text: String,
    pub intro_duration_secs: f64,
    pub outro_duration_secs: f64,
    pub tts_enabled: bool,
    pub music_enabled: bool,
    pub sfx_enabled: bool,
}

impl ProductionOptions {
    /// Resolve the options.
    ///
    /// `title` is the intro fallback text. Music and sfx toggles read the
    /// production map first and default to the matching audio flag.
    pub fn resolve(
        production: &Map<String, Value>,
        audio: &Map<String, Value>,
        title: &str,
    ) -> Self {
        let intro_fallback = if title.trim().is_empty() {
            DEFAULT_INTRO_TEXT
        } else {
            title
        };

        let music_default = parse_bool(audio.get("background_music_enabled"), true);
        let sfx_default = parse_bool(audio.get("sfx_enabled"), true);

        Self {
            intro_enabled: parse_bool(production.get("intro_enabled"), false),
            outro_enabled: parse_bool(production.get("outro_enabled"), false),
            intro_text: parse_string(production.get("intro_text"), intro_fallback),
            outro_text: parse_string(production.get("outro_text"), DEFAULT_OUTRO_TEXT),
            intro_duration_secs: title_duration(production.get("intro_duration_sec")),
            outro_duration_secs: title_duration(production.get("outro_duration_sec")),
            tts_enabled: parse_bool(audio.get("tts_enabled"), true),
            music_enabled: parse_bool(production.get("music_generation_enabled"), music_default),
            sfx_enabled: parse_bool(production.get("sfx_enabled"), sfx_default),
        }
    }
}

fn title_duration(value: Option<&Value>) -> f64 {
    (parse_int(value, DEFAULT_TITLE_DURATION_SECS) as f64).max(MIN_TITLE_DURATION_SECS)
}
