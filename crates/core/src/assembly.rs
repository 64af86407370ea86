//! Keyframe sequencing for video assembly.
//!
//! Shot frames are collected in storyboard order, optionally bracketed by
//! intro and outro title frames, each with its on-screen duration.

use std::path::{Path, PathBuf};

use crate::episode::MIN_SHOT_DURATION_SECS;

/// Shortest duration ever reported for a finished video (seconds).
pub const MIN_REPORTED_DURATION_SECS: u64 = 8;

/// A still frame and how long it stays on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub path: PathBuf,
    pub duration_secs: f64,
}

impl Keyframe {
    /// Create a keyframe; durations below one second are raised to one.
    pub fn new(path: impl Into<PathBuf>, duration_secs: f64) -> Self {
        Self {
            path: path.into(),
            duration_secs: duration_secs.max(MIN_SHOT_DURATION_SECS),
        }
    }
}

/// Ordered keyframes for one episode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeSequence {
    frames: Vec<Keyframe>,
}

impl KeyframeSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shot frame.
    pub fn push(&mut self, path: impl Into<PathBuf>, duration_secs: f64) {
        self.frames.push(Keyframe::new(path, duration_secs));
    }

    /// Put a title frame before every other frame.
    pub fn prepend_intro(&mut self, frame: Keyframe) {
        self.frames.insert(0, frame);
    }

    /// Put a title frame after every other frame.
    pub fn append_outro(&mut self, frame: Keyframe) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Keyframe] {
        &self.frames
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.frames.iter().map(|f| f.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sum of all frame durations in seconds.
    pub fn total_duration_secs(&self) -> f64 {
        self.frames.iter().map(|f| f.duration_secs).sum()
    }

    /// Whole-second duration reported on completion, never below
    /// [`MIN_REPORTED_DURATION_SECS`].
    pub fn reported_duration_secs(&self) -> u64 {
        (self.total_duration_secs().trunc() as u64).max(MIN_REPORTED_DURATION_SECS)
    }
}
