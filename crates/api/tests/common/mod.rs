#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use studio_api::config::ServerConfig;
use studio_api::router::build_app_router;
use studio_api::state::AppState;

/// URL nothing listens on.
pub const DEAD_BACKEND: &str = "http://127.0.0.1:9";

/// Build a test `ServerConfig`: no API key, no encoder, fast polling, and
/// jobs written under `work_dir`.
pub fn test_config(comfyui_url: &str, work_dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::from_lookup(|key| match key {
        "HOST" => Some("127.0.0.1".into()),
        "PORT" => Some("0".into()),
        "COMFYUI_URL" => Some(comfyui_url.into()),
        "FFMPEG_PATH" => Some("/nonexistent/ffmpeg".into()),
        "RENDER_WORK_DIR" => Some(work_dir.display().to_string()),
        _ => None,
    });
    config.pipeline.poll_interval = Duration::from_millis(10);
    config.pipeline.fallback_urls = Vec::new();
    config
}

/// Build the full application router with the production middleware stack.
pub fn build_test_app(config: ServerConfig) -> Router {
    build_app_router(AppState::new(config))
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &Value, headers: &[(&str, &str)]) -> Response<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A minimal episode request posting callbacks to `callback_url`.
pub fn episode_body(callback_url: &str) -> Value {
    json!({
        "episode_id": "ep-42",
        "job_id": "job-7",
        "episode_number": 3,
        "title": "The Lost Kite",
        "style": "pixar style",
        "storyboard": [
            { "scene": 1, "shot_index": 1, "prompt_positive": "kite over hills", "emotion": "happy" },
            { "scene": 1, "shot_index": 2, "prompt_positive": "kite in a tree", "duration_sec": 6 }
        ],
        "characters": [],
        "audio": { "tts_enabled": false },
        "callback_url": callback_url,
        "callback_key": "render-secret"
    })
}

/// A ComfyUI stand-in that completes every prompt immediately.
pub async fn mock_comfyui() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "system": { "comfyui_version": "0.3.40", "os": "posix" },
            "devices": [{ "name": "cuda:0", "type": "cuda" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/object_info/CheckpointLoaderSimple"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "CheckpointLoaderSimple": {
                "input": { "required": { "ckpt_name": [["dreamshaper_8.safetensors", "sdxl.safetensors"]] } }
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": "p-1" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p-1": { "outputs": { "9": { "images": [{ "filename": "shot.png", "subfolder": "", "type": "output" }] } } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png".to_vec()))
        .mount(&server)
        .await;
    server
}

/// A callback receiver accepting every POST.
pub async fn mock_callbacks() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

/// Wait until a callback arrives on `route` and return its JSON body.
pub async fn wait_for_callback(server: &MockServer, route: &str) -> Value {
    for _ in 0..200 {
        let received = server.received_requests().await.unwrap_or_default();
        if let Some(request) = received.iter().find(|r| r.url.path().ends_with(route)) {
            return serde_json::from_slice(&request.body).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no callback received on {route}");
}
