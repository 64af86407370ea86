//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the endpoints the render pipeline needs (status probe, node
//! capability lookup, workflow submission, history retrieval, image upload
//! and download) using [`reqwest`]. Every call carries its own timeout.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::history::OutputImage;

/// `GET /system_stats` timeout; the call doubles as a liveness probe.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
/// `GET /object_info/<class>` timeout.
pub const OBJECT_INFO_TIMEOUT: Duration = Duration::from_secs(10);
/// `POST /prompt` timeout.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
/// `GET /history/<id>` timeout for a single poll.
pub const HISTORY_TIMEOUT: Duration = Duration::from_secs(15);
/// Image upload and download timeout.
pub const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Node class whose capability listing enumerates checkpoints.
pub const CHECKPOINT_LOADER_CLASS: &str = "CheckpointLoaderSimple";

/// HTTP client for a single ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub node_errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    name: Option<String>,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A success response lacked a field the caller depends on.
    #[error("ComfyUI response missing `{field}`: {body}")]
    MissingField { field: &'static str, body: String },

    /// Reading a local file for upload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`. A trailing
    ///   slash is dropped.
    pub fn new(api_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: normalize_url(api_url),
        }
    }

    /// Base HTTP URL of this instance.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Fetch `GET /system_stats`.
    pub async fn system_stats(&self) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/system_stats", self.api_url))
            .timeout(STATUS_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Fetch `GET /object_info/{node_class}`.
    pub async fn object_info(&self, node_class: &str) -> Result<Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/object_info/{}", self.api_url, node_class))
            .timeout(OBJECT_INFO_TIMEOUT)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Checkpoint names the instance can load, in listing order.
    pub async fn checkpoint_names(&self) -> Result<Vec<String>, ComfyUIApiError> {
        let info = self.object_info(CHECKPOINT_LOADER_CLASS).await?;
        Ok(parse_checkpoint_names(&info))
    }

    /// Submit a workflow for execution.
    ///
    /// Sends `POST /prompt` with the workflow and client ID and returns the
    /// server-assigned `prompt_id`.
    pub async fn submit_workflow(
        &self,
        workflow: &Value,
        client_id: &str,
    ) -> Result<String, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await?;

        let raw: Value = Self::parse_response(response).await?;
        let submitted: SubmitResponse = serde_json::from_value(raw.clone()).unwrap_or_default();
        submitted
            .prompt_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ComfyUIApiError::MissingField {
                field: "prompt_id",
                body: raw.to_string(),
            })
    }

    /// Retrieve the history record of a prompt.
    ///
    /// `GET /history/{prompt_id}` answers with a map keyed by prompt id; the
    /// record is `None` until the prompt has finished.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Option<Value>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .timeout(HISTORY_TIMEOUT)
            .send()
            .await?;

        let mut history: Value = Self::parse_response(response).await?;
        Ok(history
            .as_object_mut()
            .and_then(|entries| entries.remove(prompt_id)))
    }

    /// Upload a local image as a workflow input.
    ///
    /// Sends a multipart `POST /upload/image` (`type=input`,
    /// `overwrite=true`) and returns the name ComfyUI stored it under.
    pub async fn upload_image(&self, path: &Path) -> Result<String, ComfyUIApiError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image.png".to_string());
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(&content_type(path))?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("type", "input")
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await?;

        let raw: Value = Self::parse_response(response).await?;
        serde_json::from_value::<UploadResponse>(raw.clone())
            .ok()
            .and_then(|r| r.name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ComfyUIApiError::MissingField {
                field: "name",
                body: raw.to_string(),
            })
    }

    /// Download an output image via `GET /view`.
    pub async fn view_image(&self, image: &OutputImage) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[
                ("filename", image.filename.as_str()),
                ("subfolder", image.subfolder.as_str()),
                ("type", image.kind.as_str()),
            ])
            .timeout(TRANSFER_TIMEOUT)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Strip trailing slashes from a base URL.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Pull checkpoint names out of an `object_info` payload:
/// `CheckpointLoaderSimple.input.required.ckpt_name[0]`.
pub fn parse_checkpoint_names(info: &Value) -> Vec<String> {
    info.pointer("/CheckpointLoaderSimple/input/required/ckpt_name/0")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn content_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_strips_trailing_slashes() {
        assert_eq!(normalize_url("http://host:8188/"), "http://host:8188");
        assert_eq!(normalize_url(" http://host:8188// "), "http://host:8188");
    }

    #[test]
    fn checkpoint_names_from_object_info() {
        let info = json!({
            "CheckpointLoaderSimple": {
                "input": { "required": { "ckpt_name": [["sd15.safetensors", "sdxl.safetensors"], {}] } }
            }
        });
        assert_eq!(
            parse_checkpoint_names(&info),
            vec!["sd15.safetensors".to_string(), "sdxl.safetensors".to_string()]
        );
        assert!(parse_checkpoint_names(&json!({})).is_empty());
        assert!(parse_checkpoint_names(&json!({
            "CheckpointLoaderSimple": { "input": { "required": { "ckpt_name": [[]] } } }
        }))
        .is_empty());
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type(Path::new("a.PNG")), "image/png");
        assert_eq!(content_type(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(content_type(Path::new("a.webp")), "image/webp");
        assert_eq!(content_type(Path::new("a")), "application/octet-stream");
    }
}
