//! Endpoint-level tests against the assembled router.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use subterm_core::config::{ImportConfig, TerminalConfig};
use subterm_server::api::{routes, websocket};
use subterm_term::TermManager;
use subterm_workspace::{FileStore, Importer};
use tokio::sync::broadcast;
use tower::ServiceExt;

fn test_app(root: &Path) -> Router {
    let terminal = TerminalConfig {
        shell: "/bin/sh".to_string(),
        term: "xterm-256color".to_string(),
        cols: 80,
        rows: 24,
    };
    let import = ImportConfig {
        timeout_secs: 5,
        depth: 1,
    };
    let (fs_tx, _) = broadcast::channel(16);

    let state = routes::AppState {
        store: Arc::new(FileStore::new(root, 1024 * 1024)),
        terminals: Arc::new(TermManager::new(terminal)),
        importer: Arc::new(Importer::new(root, import)),
        fs_events: fs_tx,
    };

    Router::new()
        .merge(routes::create_routes(state.clone()))
        .merge(websocket::websocket_routes(state))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let write = post_json(
        "/file",
        serde_json::json!({"path": "notes/todo.txt", "content": "- ship it\n"}),
    );
    let response = app.clone().oneshot(write).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["message"].is_string());

    let response = app
        .clone()
        .oneshot(get("/file?path=notes/todo.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["content"], "- ship it\n");
}

#[tokio::test]
async fn test_empty_content_creates_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let write = post_json(
        "/file",
        serde_json::json!({"path": "newdir/.keep", "content": ""}),
    );
    let response = app.clone().oneshot(write).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(get("/file?path=newdir/.keep")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["content"], "");
}

#[tokio::test]
async fn test_traversal_rejected_without_write() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let response = app.clone().oneshot(get("/file?path=../secret")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    let write = post_json(
        "/file",
        serde_json::json!({"path": "../escape.txt", "content": "nope"}),
    );
    let response = app.clone().oneshot(write).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
}

#[tokio::test]
async fn test_missing_file_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let response = app.clone().oneshot(get("/file?path=nope.txt")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_missing_path_param_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let response = app.clone().oneshot(get("/file")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_new_file_appears_in_both_tree_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let write = post_json(
        "/file",
        serde_json::json!({"path": "src/lib.rs", "content": "pub fn x() {}"}),
    );
    app.clone().oneshot(write).await.unwrap();

    let response = app.clone().oneshot(get("/files")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let nested = body_json(response).await;
    assert!(nested["tree"]["src"]["lib.rs"].is_null());
    assert!(nested["tree"]["src"].is_object());

    let response = app.clone().oneshot(get("/api/get-tree")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let flat = body_json(response).await;
    let src = flat
        .as_array()
        .unwrap()
        .iter()
        .find(|node| node["name"] == "src")
        .expect("src node");
    assert_eq!(src["children"][0]["id"], "src/lib.rs");
}

#[tokio::test]
async fn test_tree_fetch_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    for name in ["b.txt", "a.txt", "c.txt"] {
        let write = post_json("/file", serde_json::json!({"path": name, "content": "x"}));
        app.clone().oneshot(write).await.unwrap();
    }

    let one = body_json(app.clone().oneshot(get("/api/get-tree")).await.unwrap()).await;
    let two = body_json(app.clone().oneshot(get("/api/get-tree")).await.unwrap()).await;
    assert_eq!(one, two);

    let names: Vec<_> = one
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
}

#[tokio::test]
async fn test_import_rejects_bad_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let import = post_json(
        "/github/import",
        serde_json::json!({"repoUrl": "https://github.com/a/b.git", "branch": "main", "repoName": "../evil"}),
    );
    let response = app.clone().oneshot(import).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_import_name_collision_is_conflict() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("taken")).unwrap();
    let app = test_app(dir.path());

    let import = post_json(
        "/github/import",
        serde_json::json!({"repoUrl": "https://github.com/a/b.git", "branch": "main", "repoName": "taken"}),
    );
    let response = app.clone().oneshot(import).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_health() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_app(dir.path());

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_terminals"], 0);
}
