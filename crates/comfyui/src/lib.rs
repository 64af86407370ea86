//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper, instance discovery and history-record
//! parsing used to drive ComfyUI image-generation servers.

pub mod api;
pub mod history;
pub mod locator;
