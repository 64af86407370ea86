//! Per-job working directory.
//!
//! Layout: `<work_root>/<episode_id>/<job_id>/{frames,refs}`. The directory
//! belongs to exactly one job and is never shared.

use std::path::{Path, PathBuf};

use studio_core::naming::sanitize_component;

const FRAMES_DIR: &str = "frames";
const REFS_DIR: &str = "refs";

#[derive(Debug, Clone)]
pub struct JobWorkspace {
    root: PathBuf,
    frames: PathBuf,
    refs: PathBuf,
}

impl JobWorkspace {
    /// Create the job directory tree under `work_root`.
    pub async fn create(work_root: &Path, episode_id: &str, job_id: &str) -> std::io::Result<Self> {
        let root = work_root
            .join(sanitize_component(episode_id))
            .join(sanitize_component(job_id));
        let frames = root.join(FRAMES_DIR);
        let refs = root.join(REFS_DIR);
        tokio::fs::create_dir_all(&frames).await?;
        tokio::fs::create_dir_all(&refs).await?;
        Ok(Self { root, frames, refs })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames
    }

    pub fn refs_dir(&self) -> &Path {
        &self.refs
    }

    pub fn frame_path(&self, file_name: &str) -> PathBuf {
        self.frames.join(file_name)
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_layout_with_sanitized_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = JobWorkspace::create(tmp.path(), "../ep 1", "job/7").await.unwrap();

        assert!(ws.root().starts_with(tmp.path()));
        assert_eq!(ws.root(), tmp.path().join(".._ep_1").join("job_7"));
        assert!(ws.frames_dir().is_dir());
        assert!(ws.refs_dir().is_dir());
        assert_eq!(ws.frame_path("a.png"), ws.frames_dir().join("a.png"));
        assert_eq!(ws.output_path("o.mp4"), ws.root().join("o.mp4"));
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        JobWorkspace::create(tmp.path(), "ep", "job").await.unwrap();
        assert!(JobWorkspace::create(tmp.path(), "ep", "job").await.is_ok());
    }
}
