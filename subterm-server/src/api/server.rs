//! Server assembly and lifecycle.

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use subterm_core::Config;
use subterm_term::TermManager;
use subterm_workspace::{FileStore, Importer, WorkspaceWatcher};
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, Level};

use super::{routes, routes::AppState, websocket};

/// Capacity of the fs-event fan-out channel. Lagging consumers skip batches
/// and recover with one extra tree refresh.
const FS_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Run the SubTerm server (blocking until shutdown).
pub async fn start_server(config: Config) -> Result<()> {
    info!("Starting SubTerm server");

    std::fs::create_dir_all(&config.workspace.root)?;
    // The watcher and the store must agree on the resolved root.
    let root = config.workspace.root.canonicalize()?;
    info!(workspace = %root.display(), "workspace root ready");

    let store = Arc::new(FileStore::new(&root, config.workspace.max_file_size_bytes));
    let terminals = Arc::new(TermManager::new(config.terminal.clone()));
    let importer = Arc::new(Importer::new(&root, config.import.clone()));

    // Watch bridge: one watcher task fans out batches to every connection.
    let (fs_tx, _) = broadcast::channel(FS_EVENT_CHANNEL_CAPACITY);
    let mut watcher = WorkspaceWatcher::new(&root, &config.watcher)?;
    let forward_tx = fs_tx.clone();
    tokio::spawn(async move {
        while let Some(batch) = watcher.recv().await {
            debug!(changes = batch.len(), "forwarding fs-event batch");
            // No connected clients is not an error.
            let _ = forward_tx.send(batch);
        }
    });

    let state = AppState {
        store,
        terminals: Arc::clone(&terminals),
        importer,
        fs_events: fs_tx,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    let app = Router::new()
        .merge(routes::create_routes(state.clone()))
        .merge(websocket::websocket_routes(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    info!("SubTerm server starting...");
    info!("  Listening: http://{}", addr);
    info!("  Terminal:  ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Any terminal still open belongs to a connection that is now gone.
    terminals.shutdown_all();
    info!("SubTerm server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
