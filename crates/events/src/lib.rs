//! Outbound job callbacks.
//!
//! Progress, completion and failure notifications posted to the caller's
//! callback endpoint.

pub mod callback;
pub mod payload;

pub use callback::{CallbackClient, CallbackError, CallbackRoute};
