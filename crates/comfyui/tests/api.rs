//! Integration tests for the ComfyUI REST client against a mock server.

use assert_matches::assert_matches;
use serde_json::json;
use studio_comfyui::api::{ComfyUIApi, ComfyUIApiError};
use studio_comfyui::history::OutputImage;
use studio_comfyui::locator::{candidate_urls, default_fallback_urls, locate};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn submit_returns_prompt_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .and(body_partial_json(json!({ "client_id": "studioai-0123456789" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "prompt_id": "p-1", "number": 3, "node_errors": {}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(&server.uri());
    let id = api
        .submit_workflow(&json!({ "1": { "class_type": "KSampler" } }), "studioai-0123456789")
        .await
        .unwrap();
    assert_eq!(id, "p-1");
}

#[tokio::test]
async fn submit_without_prompt_id_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "bad graph" })))
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(&server.uri());
    let result = api.submit_workflow(&json!({}), "c").await;
    assert_matches!(result, Err(ComfyUIApiError::MissingField { field: "prompt_id", .. }));
}

#[tokio::test]
async fn non_success_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/prompt"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid prompt"))
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(&server.uri());
    let result = api.submit_workflow(&json!({}), "c").await;
    assert_matches!(
        result,
        Err(ComfyUIApiError::ApiError { status: 400, body }) if body == "invalid prompt"
    );
}

#[tokio::test]
async fn history_is_none_until_recorded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history/p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/history/p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "p-1": { "outputs": { "9": { "images": [{ "filename": "a.png" }] } } }
        })))
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(&server.uri());
    assert!(api.get_history("p-1").await.unwrap().is_none());
    let record = api.get_history("p-1").await.unwrap().unwrap();
    assert_eq!(record["outputs"]["9"]["images"][0]["filename"], "a.png");
}

#[tokio::test]
async fn upload_returns_stored_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .and(body_string_contains("name=\"overwrite\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "reference-abc.png", "subfolder": "", "type": "input"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("reference-abc.png");
    std::fs::write(&file, b"png-bytes").unwrap();

    let api = ComfyUIApi::new(&server.uri());
    assert_eq!(api.upload_image(&file).await.unwrap(), "reference-abc.png");
}

#[tokio::test]
async fn upload_without_name_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload/image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "subfolder": "" })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("r.png");
    std::fs::write(&file, b"x").unwrap();

    let api = ComfyUIApi::new(&server.uri());
    assert_matches!(
        api.upload_image(&file).await,
        Err(ComfyUIApiError::MissingField { field: "name", .. })
    );
}

#[tokio::test]
async fn view_downloads_image_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/view"))
        .and(query_param("filename", "a.png"))
        .and(query_param("subfolder", "sub"))
        .and(query_param("type", "output"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"image-data".to_vec()))
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(&format!("{}/", server.uri()));
    let image = OutputImage {
        filename: "a.png".into(),
        subfolder: "sub".into(),
        kind: "output".into(),
    };
    assert_eq!(api.view_image(&image).await.unwrap(), b"image-data");
}

#[tokio::test]
async fn checkpoint_names_from_capabilities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/object_info/CheckpointLoaderSimple"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "CheckpointLoaderSimple": {
                "input": { "required": { "ckpt_name": [["dreamshaper_8.safetensors"]] } }
            }
        })))
        .mount(&server)
        .await;

    let api = ComfyUIApi::new(&server.uri());
    assert_eq!(
        api.checkpoint_names().await.unwrap(),
        vec!["dreamshaper_8.safetensors".to_string()]
    );
}

#[tokio::test]
async fn locate_skips_failing_candidates() {
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&down)
        .await;

    let up = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "system": { "comfyui_version": "0.3.10" },
            "devices": []
        })))
        .mount(&up)
        .await;

    let client = reqwest::Client::new();
    let candidates = vec![down.uri(), up.uri()];
    let found = locate(&client, &candidates).await.unwrap();
    assert_eq!(found.url(), up.uri());
    assert_eq!(found.version(), Some("0.3.10"));
}

#[tokio::test]
async fn locate_returns_none_when_nothing_answers() {
    let down = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&down)
        .await;

    let client = reqwest::Client::new();
    assert!(locate(&client, &[down.uri()]).await.is_none());
}

#[test]
fn explicit_candidate_comes_first() {
    let urls = candidate_urls(Some("http://gpu-box:8188"), None, &default_fallback_urls());
    assert_eq!(urls[0], "http://gpu-box:8188");
    assert_eq!(urls.len(), 3);
}
