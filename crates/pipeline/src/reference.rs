//! Reference image resolution with a per-job single-flight cache.
//!
//! A reference URL is downloaded at most once and uploaded to the backend
//! at most once per job, even when several shots ask for it concurrently.
//! Failed attempts are not cached, so a later shot may try again.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use studio_comfyui::api::ComfyUIApiError;
use studio_core::naming::reference_filename;

use crate::backend::GenerationBackend;

/// Reference download timeout.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Length of the random token in downloaded file names.
const TOKEN_LEN: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("Failed to download reference {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Reference download {url} returned HTTP {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("Failed to store reference image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reference upload failed: {0}")]
    Upload(#[from] ComfyUIApiError),
}

// ---------------------------------------------------------------------------
// Single-flight map
// ---------------------------------------------------------------------------

/// Per-key once-initialized slots.
///
/// Concurrent callers for the same key share one initialization; callers
/// for different keys never wait on each other.
#[derive(Debug)]
struct SingleFlight<T> {
    slots: Mutex<HashMap<String, Arc<tokio::sync::OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    fn slot(&self, key: &str) -> Arc<tokio::sync::OnceCell<T>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(key.to_string()).or_default().clone()
    }

    async fn get_or_try_init<E, F, Fut>(&self, key: &str, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let slot = self.slot(key);
        slot.get_or_try_init(init).await.cloned()
    }

    fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|s| s.initialized()).count()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// Job-scoped reference resolver.
#[derive(Debug)]
pub struct ReferenceCache {
    http: reqwest::Client,
    refs_dir: PathBuf,
    downloads: SingleFlight<PathBuf>,
    uploads: SingleFlight<String>,
}

impl ReferenceCache {
    pub fn new(http: reqwest::Client, refs_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            refs_dir: refs_dir.into(),
            downloads: SingleFlight::default(),
            uploads: SingleFlight::default(),
        }
    }

    /// Backend-side image name for `url`, downloading and uploading it on
    /// first use.
    pub async fn resolve_for_backend<B: GenerationBackend>(
        &self,
        backend: &B,
        url: &str,
    ) -> Result<String, ReferenceError> {
        self.uploads
            .get_or_try_init::<ReferenceError, _, _>(url, || async {
                let local = self.download(url).await?;
                let name = backend.upload_image(&local).await?;
                tracing::debug!(url, name = %name, "Reference image uploaded");
                Ok(name)
            })
            .await
    }

    /// Local copy of `url`, fetched on first use.
    pub async fn download(&self, url: &str) -> Result<PathBuf, ReferenceError> {
        self.downloads
            .get_or_try_init(url, || self.fetch(url))
            .await
    }

    /// Number of distinct URLs uploaded so far.
    pub fn uploaded_count(&self) -> usize {
        self.uploads.len()
    }

    async fn fetch(&self, url: &str) -> Result<PathBuf, ReferenceError> {
        let response = self
            .http
            .get(url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|source| ReferenceError::Download {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReferenceError::DownloadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|source| ReferenceError::Download {
                url: url.to_string(),
                source,
            })?;

        let token = uuid::Uuid::new_v4().simple().to_string();
        let path = self
            .refs_dir
            .join(reference_filename(url, &token[..TOKEN_LEN]));
        tokio::fs::write(&path, &bytes).await?;
        Ok(path)
    }
}
