//! HTTP route handlers.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use subterm_core::FsChange;
use subterm_term::TermManager;
use subterm_workspace::{FileStore, ImportRequest, Importer, ScopedPath, TreeNode, TreeSnapshot};
use tokio::sync::broadcast;
use tracing::info;

use super::error::ApiError;

/// Application state shared across routes and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<FileStore>,
    pub terminals: Arc<TermManager>,
    pub importer: Arc<Importer>,
    pub fs_events: broadcast::Sender<Vec<FsChange>>,
}

/// Create all HTTP routes.
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/file", get(read_file).post(write_file))
        .route("/files", get(nested_tree))
        .route("/api/get-tree", get(flat_tree))
        .route("/github/import", post(import_repository))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct FileContentResponse {
    content: String,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Debug, Deserialize)]
struct WriteFileRequest {
    path: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct TreeResponse {
    tree: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    active_terminals: usize,
}

/// GET /file?path=P — read a file as text.
async fn read_file(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<FileContentResponse>, ApiError> {
    let raw = params
        .get("path")
        .ok_or_else(|| ApiError::BadRequest("missing query parameter: path".to_string()))?;

    let path = ScopedPath::parse(raw)?;
    let content = state.store.read_file(&path).await?;
    Ok(Json(FileContentResponse { content }))
}

/// POST /file — create or overwrite a file, creating parents as needed.
async fn write_file(
    State(state): State<AppState>,
    Json(request): Json<WriteFileRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let path = ScopedPath::parse(&request.path)?;
    state.store.write_file(&path, &request.content).await?;

    info!(path = %path, bytes = request.content.len(), "file saved");
    Ok(Json(MessageResponse {
        message: format!("Saved {}", path),
    }))
}

/// GET /files — nested mapping tree shape.
async fn nested_tree(State(state): State<AppState>) -> Result<Json<TreeResponse>, ApiError> {
    let snapshot = TreeSnapshot::capture(state.store.root())?;
    Ok(Json(TreeResponse {
        tree: snapshot.to_nested(),
    }))
}

/// GET /api/get-tree — flat node-array tree shape.
async fn flat_tree(State(state): State<AppState>) -> Result<Json<Vec<TreeNode>>, ApiError> {
    let snapshot = TreeSnapshot::capture(state.store.root())?;
    Ok(Json(snapshot.to_flat()))
}

/// POST /github/import — clone a repository into the workspace.
///
/// The clone runs as its own task so it cannot wedge the connection's
/// request pipeline, but the response is only sent once it finishes: the
/// client awaits exactly one reply and never polls.
async fn import_repository(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    info!(repo = %request.repo_name, branch = %request.branch, "import requested");

    let importer = Arc::clone(&state.importer);
    let job = request.clone();
    tokio::spawn(async move { importer.import(&job).await })
        .await
        .map_err(|e| ApiError::Internal(format!("import task failed: {}", e)))??;

    Ok(Json(MessageResponse {
        message: format!("Imported {} ({})", request.repo_name, request.branch),
    }))
}

/// GET /health — liveness and session count.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        active_terminals: state.terminals.active_count(),
    })
}
