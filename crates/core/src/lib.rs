//! Domain logic for the episode render pipeline.
//!
//! Everything in this crate is free of network I/O: request model, render
//! configuration, prompt and seed derivation, generation-graph templating,
//! keyframe sequencing and the ffmpeg wrapper.

pub mod assembly;
pub mod coerce;
pub mod emotion;
pub mod episode;
pub mod error;
pub mod ffmpeg;
pub mod hashing;
pub mod naming;
pub mod production;
pub mod progress;
pub mod prompt;
pub mod render_config;
pub mod workflow;
