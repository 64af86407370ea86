//! Episode render pipeline.
//!
//! Drives a generation backend shot by shot, degrades failed shots to
//! fallback frames when allowed, and assembles the keyframes into a video.

pub mod assembler;
pub mod backend;
pub mod orchestrator;
pub mod reference;
pub mod shot;
pub mod sink;
pub mod workspace;

pub use backend::GenerationBackend;
pub use orchestrator::{run_job, run_render_job, JobOutput, JobPlan, PipelineError, PipelineSettings};
pub use sink::ProgressSink;
