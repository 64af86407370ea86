//! The seam between the pipeline and the image-generation backend.
//!
//! The shot renderer and reference cache only see [`GenerationBackend`];
//! [`ComfyUIApi`] is the production implementation.

use std::future::Future;
use std::path::Path;

use serde_json::Value;
use studio_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use studio_comfyui::history::OutputImage;

/// A job-queue style image generator: submit a graph, poll its history,
/// fetch the produced images.
pub trait GenerationBackend: Send + Sync {
    /// Base URL reported in completion metadata.
    fn base_url(&self) -> &str;

    /// Queue a graph and return the backend's job identifier.
    fn submit(
        &self,
        graph: &Value,
        client_id: &str,
    ) -> impl Future<Output = Result<String, ComfyUIApiError>> + Send;

    /// History record of a job, `None` while it is still running.
    fn history(
        &self,
        prompt_id: &str,
    ) -> impl Future<Output = Result<Option<Value>, ComfyUIApiError>> + Send;

    /// Upload a local image and return the name the backend stored it as.
    fn upload_image(
        &self,
        path: &Path,
    ) -> impl Future<Output = Result<String, ComfyUIApiError>> + Send;

    /// Raw bytes of an output image.
    fn fetch_image(
        &self,
        image: &OutputImage,
    ) -> impl Future<Output = Result<Vec<u8>, ComfyUIApiError>> + Send;

    /// Checkpoint names the backend can load.
    fn checkpoint_names(&self) -> impl Future<Output = Result<Vec<String>, ComfyUIApiError>> + Send;
}

impl GenerationBackend for ComfyUIApi {
    fn base_url(&self) -> &str {
        self.api_url()
    }

    async fn submit(&self, graph: &Value, client_id: &str) -> Result<String, ComfyUIApiError> {
        self.submit_workflow(graph, client_id).await
    }

    async fn history(&self, prompt_id: &str) -> Result<Option<Value>, ComfyUIApiError> {
        self.get_history(prompt_id).await
    }

    async fn upload_image(&self, path: &Path) -> Result<String, ComfyUIApiError> {
        ComfyUIApi::upload_image(self, path).await
    }

    async fn fetch_image(&self, image: &OutputImage) -> Result<Vec<u8>, ComfyUIApiError> {
        self.view_image(image).await
    }

    async fn checkpoint_names(&self) -> Result<Vec<String>, ComfyUIApiError> {
        ComfyUIApi::checkpoint_names(self).await
    }
}

/// Default checkpoint: a forced name wins, otherwise the first one the
/// backend lists. Listing failures are logged and treated as "none".
pub async fn resolve_checkpoint<B: GenerationBackend>(
    backend: &B,
    forced: Option<&str>,
) -> Option<String> {
    if let Some(name) = forced.map(str::trim).filter(|n| !n.is_empty()) {
        return Some(name.to_string());
    }
    match backend.checkpoint_names().await {
        Ok(names) => names.into_iter().next(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to list checkpoints");
            None
        }
    }
}
