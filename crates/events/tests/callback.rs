//! Callback delivery against a mock receiver.

use serde_json::json;
use studio_events::callback::CALLBACK_KEY_HEADER;
use studio_events::payload::{CompletionMetadata, RENDER_MODE};
use studio_events::{CallbackClient, CallbackError, CallbackRoute};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> CallbackClient {
    CallbackClient::for_job(
        reqwest::Client::new(),
        &format!("{}/api/render", server.uri()),
        "shared-secret",
        "ep-1",
        "job-9",
    )
}

#[tokio::test]
async fn progress_carries_key_header_and_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/render/progress"))
        .and(header(CALLBACK_KEY_HEADER, "shared-secret"))
        .and(body_json(json!({
            "episode_id": "ep-1",
            "job_id": "job-9",
            "progress_percent": 12,
            "current_step": "comfyui_connected:0.3.10"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).progress(12, "comfyui_connected:0.3.10").await;
}

#[tokio::test]
async fn complete_and_failed_routes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/render/complete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/render/failed"))
        .and(body_json(json!({
            "episode_id": "ep-1",
            "job_id": "job-9",
            "error_message": "boom"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let callbacks = client(&server);
    callbacks
        .complete(
            "/tmp/out.mp4",
            8,
            CompletionMetadata {
                mode: RENDER_MODE.into(),
                shot_count: 1,
                comfyui_url: "http://127.0.0.1:8188".into(),
                intro_enabled: false,
                outro_enabled: false,
                tts_enabled: true,
                music_enabled: true,
                sfx_enabled: true,
                voice_cast_count: 0,
            },
        )
        .await;
    callbacks.failed("boom").await;
}

#[tokio::test]
async fn rejected_callback_is_attempted_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/render/progress"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    // Delivery failure is logged, not retried and not propagated.
    client(&server).progress(5, "queued_on_render_server").await;

    let err = client(&server)
        .send(CallbackRoute::Failed, &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, CallbackError::HttpStatus(404)));
}
