//! Emotion normalization and reference-image selection.

use std::fmt;

use crate::episode::{Character, Shot};

/// Canonical emotion tag.
///
/// Free-form tags are folded into a closed set by substring matching.
/// Unrecognized tags are kept verbatim (trimmed, lowercased) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Excited,
    Scared,
    Thinking,
    Surprised,
    Neutral,
    Other(String),
}

impl Emotion {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Excited => "excited",
            Self::Scared => "scared",
            Self::Thinking => "thinking",
            Self::Surprised => "surprised",
            Self::Neutral => "neutral",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold a free-form emotion tag into its canonical form. Blank is neutral.
///
/// Substring rules are checked in a fixed order and the first match wins.
pub fn normalize_emotion(raw: &str) -> Emotion {
    let value = raw.trim().to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| value.contains(n));

    if value.is_empty() || value == "neutral" {
        Emotion::Neutral
    } else if has(&["happy", "joy"]) {
        Emotion::Happy
    } else if has(&["sad"]) {
        Emotion::Sad
    } else if has(&["angry", "mad"]) {
        Emotion::Angry
    } else if has(&["excited"]) {
        Emotion::Excited
    } else if has(&["scared", "fear"]) {
        Emotion::Scared
    } else if has(&["think"]) {
        Emotion::Thinking
    } else if has(&["surpris"]) {
        Emotion::Surprised
    } else {
        Emotion::Other(value)
    }
}

/// The reference image chosen for a shot, with its optional prompt hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceChoice {
    pub url: Option<String>,
    pub hint: String,
}

impl ReferenceChoice {
    fn from_url(url: Option<&str>) -> Self {
        Self {
            url: url.map(str::to_string),
            hint: String::new(),
        }
    }
}

/// Pick the reference image that best matches the shot's emotion.
///
/// Search order over the character's emotion references: exact normalized
/// match, then a neutral reference, then the first usable one. With no
/// usable per-emotion reference the character's own reference is used.
pub fn pick_emotion_reference(character: Option<&Character>, shot: &Shot) -> ReferenceChoice {
    let Some(character) = character else {
        return ReferenceChoice::default();
    };
    let refs = &character.emotion_references;
    if refs.is_empty() {
        return ReferenceChoice::from_url(character.reference_url());
    }

    let desired = normalize_emotion(&shot.emotion);
    let usable = || refs.iter().filter(|r| r.reference_url().is_some());

    usable()
        .find(|r| normalize_emotion(&r.emotion) == desired)
        .or_else(|| usable().find(|r| normalize_emotion(&r.emotion) == Emotion::Neutral))
        .or_else(|| usable().next())
        .map(|r| ReferenceChoice {
            url: r.reference_url().map(str::to_string),
            hint: r.prompt_hint.clone(),
        })
        .unwrap_or_else(|| ReferenceChoice::from_url(character.reference_url()))
}
