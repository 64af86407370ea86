//! Fire-and-forget callback delivery.
//!
//! [`CallbackClient`] posts job progress and outcome to the caller's
//! callback base URL. Each callback is attempted exactly once: failures are
//! logged at `warn` and never retried or surfaced to the render job.

use std::time::Duration;

use serde::Serialize;

use crate::payload::{CompletePayload, CompletionMetadata, FailedPayload, ProgressPayload};

/// Header carrying the shared secret on every callback.
pub const CALLBACK_KEY_HEADER: &str = "x-render-server-key";

/// HTTP request timeout for a single callback.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for callback delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Callback returned HTTP {0}")]
    HttpStatus(u16),
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackRoute {
    Progress,
    Complete,
    Failed,
}

impl CallbackRoute {
    pub fn path(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// CallbackClient
// ---------------------------------------------------------------------------

/// Callback sender bound to one job.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    client: reqwest::Client,
    base_url: String,
    key: String,
    episode_id: String,
    job_id: String,
}

impl CallbackClient {
    /// Create a sender for one job's callbacks.
    pub fn for_job(
        client: reqwest::Client,
        base_url: &str,
        key: &str,
        episode_id: &str,
        job_id: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            episode_id: episode_id.to_string(),
            job_id: job_id.to_string(),
        }
    }

    /// Full URL of a callback route.
    pub fn url(&self, route: CallbackRoute) -> String {
        format!("{}/{}", self.base_url, route.path())
    }

    /// Report progress.
    pub async fn progress(&self, percent: u8, step: &str) {
        let payload = ProgressPayload {
            episode_id: self.episode_id.clone(),
            job_id: self.job_id.clone(),
            progress_percent: percent,
            current_step: step.to_string(),
        };
        self.notify(CallbackRoute::Progress, &payload).await;
    }

    /// Report a finished render.
    pub async fn complete(&self, output_url: &str, duration_seconds: u64, metadata: CompletionMetadata) {
        let payload = CompletePayload {
            episode_id: self.episode_id.clone(),
            job_id: self.job_id.clone(),
            output_url: output_url.to_string(),
            duration_seconds,
            metadata,
        };
        self.notify(CallbackRoute::Complete, &payload).await;
    }

    /// Report a failed render.
    pub async fn failed(&self, error_message: &str) {
        let payload = FailedPayload {
            episode_id: self.episode_id.clone(),
            job_id: self.job_id.clone(),
            error_message: error_message.to_string(),
        };
        self.notify(CallbackRoute::Failed, &payload).await;
    }

    /// Send once and log any failure.
    async fn notify<T: Serialize>(&self, route: CallbackRoute, payload: &T) {
        if let Err(e) = self.send(route, payload).await {
            tracing::warn!(
                route = route.path(),
                job_id = %self.job_id,
                error = %e,
                "Callback delivery failed"
            );
        }
    }

    /// Execute a single POST request and check the response status.
    pub async fn send<T: Serialize>(
        &self,
        route: CallbackRoute,
        payload: &T,
    ) -> Result<(), CallbackError> {
        let response = self
            .client
            .post(self.url(route))
            .header(CALLBACK_KEY_HEADER, &self.key)
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(CallbackError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
