//! Deterministic prompt and seed construction per shot.
//!
//! Everything here is a pure function of the episode, the shot and the
//! resolved configuration, so re-rendering an episode reproduces the same
//! prompts and seeds.

use crate::emotion::ReferenceChoice;
use crate::episode::{Character, EpisodeRequest, Shot};
use crate::hashing::stable_seed;
use crate::render_config::RenderConfig;

/// Baseline appended to every negative prompt unless overridden.
pub const DEFAULT_NEGATIVE_BASE: &str =
    "blurry, low quality, distorted face, extra limbs, text, watermark";

/// Seed offset per scene number.
pub const SCENE_SEED_STRIDE: i64 = 1000;

/// Seed offset per shot index.
pub const SHOT_SEED_STRIDE: i64 = 17;

const FRAGMENT_SEPARATOR: &str = ", ";
const CHARACTER_SEPARATOR: &str = " | ";

/// Prompts and seed for one shot.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotPrompt {
    pub positive: String,
    pub negative: String,
    pub seed: i64,
    /// Reference image in use, passed through unchanged.
    pub reference_url: Option<String>,
}

/// Build the positive/negative prompts and seed for a shot.
///
/// `negative_base` is appended to the negative prompt when non-empty.
pub fn build_shot_prompt(
    episode: &EpisodeRequest,
    shot: &Shot,
    focus: Option<&Character>,
    config: &RenderConfig,
    negative_base: &str,
    reference: &ReferenceChoice,
) -> ShotPrompt {
    let mut positive: Vec<String> = [
        episode.style.as_str(),
        shot.prompt_positive.as_str(),
        shot.action.as_str(),
    ]
    .iter()
    .filter_map(|p| non_empty(p))
    .map(str::to_string)
    .collect();
    if let Some(camera) = non_empty(&shot.camera) {
        positive.push(format!("camera: {camera}"));
    }
    if let Some(emotion) = non_empty(&shot.emotion) {
        positive.push(format!("emotion: {emotion}"));
    }

    let cast: Vec<String> = episode
        .characters
        .iter()
        .filter(|c| !c.positive_prompt.is_empty())
        .map(|c| format!("{}: {}", c.name, c.positive_prompt))
        .collect();
    if !cast.is_empty() {
        positive.push(format!("characters: {}", cast.join(CHARACTER_SEPARATOR)));
    }

    if reference.url.is_some() {
        positive.push(format!(
            "reference consistency strength {:.2}, same face, same outfit, same colors",
            config.reference_strength
        ));
        if !reference.hint.is_empty() {
            positive.push(format!("emotion reference: {}", reference.hint));
        }
    }

    let mut negative: Vec<String> = non_empty(&shot.prompt_negative)
        .map(str::to_string)
        .into_iter()
        .collect();
    let cast_negative: Vec<&str> = episode
        .characters
        .iter()
        .map(|c| c.negative_prompt.as_str())
        .filter(|n| !n.is_empty())
        .collect();
    if !cast_negative.is_empty() {
        negative.push(cast_negative.join(CHARACTER_SEPARATOR));
    }
    if !negative_base.is_empty() {
        negative.push(negative_base.to_string());
    }

    ShotPrompt {
        positive: positive.join(FRAGMENT_SEPARATOR),
        negative: negative.join(FRAGMENT_SEPARATOR),
        seed: shot_seed(episode, shot, focus),
        reference_url: reference.url.clone(),
    }
}

/// Episode-wide base seed derived from its identity.
pub fn episode_base_seed(episode: &EpisodeRequest) -> i64 {
    let number = episode.episode_number.unwrap_or(0);
    let title = if episode.title.is_empty() {
        "episode"
    } else {
        episode.title.as_str()
    };
    stable_seed(&[&episode.episode_id, &number, &title])
}

/// Seed for a shot.
///
/// An explicit shot seed is used verbatim. Otherwise the focus character's
/// seed (or the episode base seed) is offset by scene and shot index so
/// sibling shots land far apart.
pub fn shot_seed(episode: &EpisodeRequest, shot: &Shot, focus: Option<&Character>) -> i64 {
    if let Some(seed) = shot.seed {
        return seed;
    }
    let base = focus
        .and_then(|c| c.seed)
        .unwrap_or_else(|| episode_base_seed(episode));
    base.saturating_add(shot.scene.saturating_mul(SCENE_SEED_STRIDE))
        .saturating_add(shot.shot_index.saturating_mul(SHOT_SEED_STRIDE))
}

fn non_empty(fragment: &str) -> Option<&str> {
    let trimmed = fragment.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
