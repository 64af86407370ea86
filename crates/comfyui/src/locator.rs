//! Discovery of a reachable ComfyUI instance.
//!
//! Candidates are probed in order with `GET /system_stats`; the first one
//! that answers successfully wins. Finding nothing is not an error here.

use serde_json::Value;

use crate::api::{normalize_url, ComfyUIApi};
use crate::history::comfyui_version;

/// Local instances tried after any configured URL.
pub const DEFAULT_COMFYUI_URLS: [&str; 2] = ["http://127.0.0.1:8000", "http://127.0.0.1:8188"];

/// A backend that answered the status probe.
#[derive(Debug, Clone)]
pub struct LocatedBackend {
    pub api: ComfyUIApi,
    /// The `/system_stats` payload returned by the probe.
    pub stats: Value,
}

impl LocatedBackend {
    pub fn url(&self) -> &str {
        self.api.api_url()
    }

    pub fn version(&self) -> Option<&str> {
        comfyui_version(&self.stats)
    }
}

/// The built-in local fallbacks as owned strings.
pub fn default_fallback_urls() -> Vec<String> {
    DEFAULT_COMFYUI_URLS.map(String::from).to_vec()
}

/// Ordered, de-duplicated candidate URLs: explicit, configured, fallbacks.
pub fn candidate_urls(
    explicit: Option<&str>,
    configured: Option<&str>,
    fallbacks: &[String],
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    for raw in [explicit, configured]
        .into_iter()
        .flatten()
        .chain(fallbacks.iter().map(String::as_str))
    {
        let url = normalize_url(raw);
        if !url.is_empty() && !candidates.contains(&url) {
            candidates.push(url);
        }
    }
    candidates
}

/// Probe `candidates` in order and return the first live backend.
pub async fn locate(client: &reqwest::Client, candidates: &[String]) -> Option<LocatedBackend> {
    for url in candidates {
        let api = ComfyUIApi::with_client(client.clone(), url);
        match api.system_stats().await {
            Ok(stats) => {
                tracing::debug!(url = %url, "ComfyUI instance located");
                return Some(LocatedBackend { api, stats });
            }
            Err(e) => tracing::debug!(url = %url, error = %e, "ComfyUI candidate not reachable"),
        }
    }
    None
}
