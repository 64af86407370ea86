use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the config sits behind an `Arc` and the HTTP client
/// is reference-counted internally.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Client shared by backend probes, reference downloads and callbacks.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }
}
