//! Episode request data model.
//!
//! An [`EpisodeRequest`] is deserialized once from the inbound submission
//! and is read-only afterwards. Callers routinely send explicit `null` for
//! optional text fields, so those deserialize to the field default instead
//! of failing.

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;

/// Role that marks a character as the episode's lead.
pub const MAIN_ROLE: &str = "main";

/// Shot duration used when a shot omits one (seconds).
pub const DEFAULT_SHOT_DURATION_SECS: f64 = 4.0;

/// Minimum on-screen duration of a shot keyframe (seconds).
pub const MIN_SHOT_DURATION_SECS: f64 = 1.0;

/// Camera description used when a shot omits one.
pub const DEFAULT_CAMERA: &str = "medium";

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

/// A full render request for one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeRequest {
    pub episode_id: String,
    pub job_id: String,
    #[serde(default)]
    pub episode_number: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub script: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub moral: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub style: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub storyboard: Vec<Shot>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub characters: Vec<Character>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub audio: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub render: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub production: Map<String, Value>,
    pub callback_url: String,
    pub callback_key: String,
}

impl EpisodeRequest {
    /// Check the fields the pipeline cannot run without.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("episode_id", &self.episode_id),
            ("job_id", &self.job_id),
            ("callback_url", &self.callback_url),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }

    /// Shots to render, in order. An empty storyboard renders one default
    /// shot so that every job produces at least one keyframe.
    pub fn effective_storyboard(&self) -> Cow<'_, [Shot]> {
        if self.storyboard.is_empty() {
            Cow::Owned(vec![Shot::default()])
        } else {
            Cow::Borrowed(&self.storyboard)
        }
    }

    /// The episode's lead character.
    ///
    /// Preference order: first character with role `main`, first character
    /// with a reference image, first character.
    pub fn primary_character(&self) -> Option<&Character> {
        self.characters
            .iter()
            .find(|c| c.role.eq_ignore_ascii_case(MAIN_ROLE))
            .or_else(|| self.characters.iter().find(|c| c.reference_url().is_some()))
            .or_else(|| self.characters.first())
    }

    /// The character a shot is framed around.
    ///
    /// Matches the shot's `focus_character` by name, case-insensitively.
    /// Unknown or blank names fall back to `primary`.
    pub fn focus_character<'a>(
        &'a self,
        shot: &Shot,
        primary: Option<&'a Character>,
    ) -> Option<&'a Character> {
        let target = shot.focus_character.trim().to_lowercase();
        if target.is_empty() {
            return primary;
        }
        self.characters
            .iter()
            .find(|c| c.name.to_lowercase() == target)
            .or(primary)
    }

    /// Number of characters with a voice actor assigned.
    pub fn voice_cast_count(&self) -> usize {
        self.characters
            .iter()
            .filter(|c| {
                c.voice_assignment
                    .as_ref()
                    .is_some_and(|v| !v.voice_actor_id.is_empty())
            })
            .count()
    }
}

// ---------------------------------------------------------------------------
// Shot
// ---------------------------------------------------------------------------

/// One storyboard unit; renders to exactly one keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    #[serde(default = "default_one", deserialize_with = "null_as_one")]
    pub scene: i64,
    #[serde(default = "default_one", deserialize_with = "null_as_one")]
    pub shot_index: i64,
    #[serde(default = "default_duration", deserialize_with = "null_as_duration")]
    pub duration_sec: f64,
    #[serde(default = "default_camera", deserialize_with = "null_as_camera")]
    pub camera: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub emotion: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub music_mood: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_positive: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_negative: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub focus_character: String,
    #[serde(default)]
    pub seed: Option<i64>,
}

impl Default for Shot {
    fn default() -> Self {
        Self {
            scene: 1,
            shot_index: 1,
            duration_sec: DEFAULT_SHOT_DURATION_SECS,
            camera: DEFAULT_CAMERA.to_string(),
            action: String::new(),
            emotion: String::new(),
            music_mood: String::new(),
            prompt_positive: String::new(),
            prompt_negative: String::new(),
            focus_character: String::new(),
            seed: None,
        }
    }
}

impl Shot {
    /// On-screen duration of the shot's keyframe.
    ///
    /// A zero duration means "unset" and becomes the default; the result is
    /// never below [`MIN_SHOT_DURATION_SECS`].
    pub fn keyframe_duration(&self) -> f64 {
        let raw = if self.duration_sec == 0.0 || !self.duration_sec.is_finite() {
            DEFAULT_SHOT_DURATION_SECS
        } else {
            self.duration_sec
        };
        raw.max(MIN_SHOT_DURATION_SECS)
    }
}

// ---------------------------------------------------------------------------
// Characters
// ---------------------------------------------------------------------------

/// A cast member referenced by shots and prompts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub positive_prompt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub negative_prompt: String,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub reference_image_url: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub emotion_references: Vec<EmotionReference>,
    #[serde(default)]
    pub voice_assignment: Option<VoiceAssignment>,
}

impl Character {
    /// Top-level reference image, ignoring blank URLs.
    pub fn reference_url(&self) -> Option<&str> {
        usable_url(self.reference_image_url.as_deref())
    }
}

/// A per-emotion reference image for a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionReference {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default = "default_emotion", deserialize_with = "null_as_emotion")]
    pub emotion: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_hint: String,
    #[serde(default)]
    pub reference_image_url: Option<String>,
}

impl EmotionReference {
    pub fn reference_url(&self) -> Option<&str> {
        usable_url(self.reference_image_url.as_deref())
    }
}

/// Voice casting for a character. Carried through to completion metadata
/// only; no speech is synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAssignment {
    #[serde(default, deserialize_with = "null_as_default")]
    pub voice_actor_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub voice_actor_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub external_voice_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tts_style: String,
    #[serde(default = "default_tts_speed")]
    pub tts_speed: f64,
    #[serde(default)]
    pub tts_pitch: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub settings: Map<String, Value>,
}

fn usable_url(url: Option<&str>) -> Option<&str> {
    url.map(str::trim).filter(|u| !u.is_empty())
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_one<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    Ok(Option::<i64>::deserialize(deserializer)?.unwrap_or_else(default_one))
}

fn null_as_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_else(default_duration))
}

fn null_as_camera<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_camera))
}

fn null_as_emotion<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(default_emotion))
}

fn default_one() -> i64 {
    1
}

fn default_duration() -> f64 {
    DEFAULT_SHOT_DURATION_SECS
}

fn default_camera() -> String {
    DEFAULT_CAMERA.to_string()
}

fn default_emotion() -> String {
    "neutral".to_string()
}

fn default_tts_speed() -> f64 {
    1.0
}
