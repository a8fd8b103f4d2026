use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use std::path::Path;
use tower::ServiceExt;
use uppy_bridge::config::BridgeConfig;
use uppy_bridge::services::materializer::Materializer;
use uppy_bridge::widget::UppyConfig;
use uppy_bridge::{AppState, create_app};

fn test_app(upload_dir: &Path) -> Router {
    let config = BridgeConfig {
        upload_dir: upload_dir.to_path_buf(),
        ..BridgeConfig::development()
    };
    let materializer = Materializer::from_config(&config).unwrap();
    let widget = UppyConfig::builder("files").build().unwrap();
    let state = AppState::new(config, uppy_bridge::init(), materializer, vec![widget]);
    create_app(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn send_raw(app: &Router, uri: &str) -> (StatusCode, String, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8_lossy(&bytes).into_owned())
}

fn batch_of_two() -> Value {
    json!({
        "type": "uppy.files",
        "value": {
            "files": [
                {"name": "hello.txt", "size": 5, "type": "text/plain", "data": "data:text/plain;base64,aGVsbG8="},
                {"name": "data.csv", "size": 4, "type": "text/csv", "data": "data:text/csv;base64,YSxiCg=="}
            ]
        }
    })
}

#[tokio::test]
async fn test_publish_then_read_value() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, table) = send(&app, "POST", "/sessions/s1/inputs/files", Some(batch_of_two())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        table["columns"],
        json!(["name", "size", "type", "datapath", "remoteReference"])
    );
    assert_eq!(table["rows"].as_array().unwrap().len(), 2);
    assert_eq!(table["rows"][0]["name"], "hello.txt");
    assert_eq!(table["rows"][0]["size"], 5);
    assert_eq!(table["rows"][1]["type"], "text/csv");

    let datapath = table["rows"][0]["datapath"].as_str().unwrap();
    assert_eq!(std::fs::read(datapath).unwrap(), b"hello");

    let (status, current) = send(&app, "GET", "/sessions/s1/inputs/files", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(current, table);

    let (_, other) = send(&app, "GET", "/sessions/s2/inputs/files", None).await;
    assert_eq!(other["rows"], json!([]));
}

#[tokio::test]
async fn test_bare_batch_value_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, table) = send(
        &app,
        "POST",
        "/sessions/s1/inputs/files",
        Some(json!({"files": []})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(table["rows"], json!([]));
    assert_eq!(table["columns"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_non_batch_value_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, body) = send(
        &app,
        "POST",
        "/sessions/s1/inputs/files",
        Some(json!({"type": "uppy.files", "value": 42})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("files"));

    let (status, _) = send(
        &app,
        "POST",
        "/sessions/s1/inputs/files",
        Some(json!({"type": "something.else", "value": {"files": []}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_ids_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, _) = send(&app, "GET", "/sessions/s1/inputs/1files", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reset_clears_value() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (_, table) = send(&app, "POST", "/sessions/s1/inputs/files", Some(batch_of_two())).await;
    let datapath = table["rows"][0]["datapath"].as_str().unwrap().to_string();

    let (status, command) = send(&app, "POST", "/sessions/s1/inputs/files/reset", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(command, json!({"type": "uppy-reset", "inputId": "files"}));

    let (_, current) = send(&app, "GET", "/sessions/s1/inputs/files", None).await;
    assert_eq!(current["rows"], json!([]));
    assert!(Path::new(&datapath).exists());

    let (_, table) = send(&app, "POST", "/sessions/s1/inputs/files", Some(batch_of_two())).await;
    let datapath = table["rows"][1]["datapath"].as_str().unwrap().to_string();
    send(&app, "POST", "/sessions/s1/inputs/files/reset?purge=true", None).await;
    assert!(!Path::new(&datapath).exists());
}

#[tokio::test]
async fn test_end_session_deletes_files() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    send(&app, "POST", "/sessions/s9/inputs/files", Some(batch_of_two())).await;
    send(&app, "POST", "/sessions/s9/inputs/other", Some(batch_of_two())).await;

    let (status, body) = send(&app, "DELETE", "/sessions/s9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_files"], 4);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_end_session_deletes_replaced_batches() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    send(&app, "POST", "/sessions/s1/inputs/files", Some(batch_of_two())).await;
    let (_, latest) = send(&app, "POST", "/sessions/s1/inputs/files", Some(batch_of_two())).await;
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);

    let (_, current) = send(&app, "GET", "/sessions/s1/inputs/files", None).await;
    assert_eq!(current, latest);

    let (status, body) = send(&app, "DELETE", "/sessions/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_files"], 4);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_widget_page_and_bridge_script() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, content_type, html) = send_raw(&app, "/widgets/files?session=abc").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert!(html.contains(r#"<div id="files""#));
    assert!(html.contains("/sessions/abc/inputs/files"));
    assert!(html.contains("attachUppyBridge"));

    let (status, _, _) = send_raw(&app, "/widgets/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, content_type, script) = send_raw(&app, "/assets/uppy-bridge.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/javascript"));
    assert!(script.contains("export function attachUppyBridge"));
}

#[tokio::test]
async fn test_health_and_request_id() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["storage"], "writable");
    assert_eq!(health["input_types"], json!(["uppy.files"]));
}
