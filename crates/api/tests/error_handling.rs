//! Tests for `AppError` → HTTP response mapping.
//!
//! These tests call `IntoResponse` directly on `AppError` values; no HTTP
//! server is involved.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use studio_api::error::AppError;
use studio_core::error::CoreError;

/// Helper: convert an `AppError` into its status code and parsed JSON body.
async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn validation_error_returns_400() {
    let err = AppError::Core(CoreError::Validation("episode_id must not be empty".into()));

    let (status, json) = error_to_response(err).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "episode_id must not be empty");
}

#[tokio::test]
async fn forbidden_error_returns_403() {
    let (status, json) = error_to_response(AppError::Forbidden("Invalid API key".into())).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn unavailable_error_returns_503() {
    let (status, json) =
        error_to_response(AppError::ServiceUnavailable("ComfyUI not reachable".into())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(json["error"], "ComfyUI not reachable");
}

#[tokio::test]
async fn bad_request_error_returns_400() {
    let (status, json) = error_to_response(AppError::BadRequest("invalid field value".into())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");
    assert_eq!(json["error"], "invalid field value");
}

#[tokio::test]
async fn request_validation_propagates_as_validation_error() {
    fn accept(body: serde_json::Value) -> studio_api::error::AppResult<()> {
        let request: studio_core::episode::EpisodeRequest = serde_json::from_value(body).unwrap();
        request.validate()?;
        Ok(())
    }

    let err = accept(serde_json::json!({
        "episode_id": "ep-1",
        "job_id": " ",
        "callback_url": "http://cb",
        "callback_key": "k"
    }))
    .unwrap_err();

    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert_eq!(json["error"], "job_id must not be empty");
}
