//! Request extractors guarding the API.
//!
//! - [`api_key::ApiKey`] -- Checks `x-api-key` against the configured key.

pub mod api_key;
