//! WebSocket bridge: terminal I/O and workspace change notifications.
//!
//! Each connection owns exactly one terminal session, created on upgrade and
//! destroyed on disconnect. The same socket also carries `fs-event` batches
//! so the client can refresh its tree without polling.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subterm_core::FsChange;
use subterm_term::TermSession;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::routes::AppState;

/// Messages the client sends.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
pub enum ClientMessage {
    /// Keystrokes destined for the shell.
    #[serde(rename = "terminal:write")]
    TerminalWrite { data: String },
    /// Viewport dimension change.
    #[serde(rename = "terminal:resize")]
    TerminalResize { cols: u16, rows: u16 },
}

/// Messages the server sends.
#[derive(Debug, Serialize)]
#[serde(tag = "event")]
pub enum ServerMessage {
    /// Shell output, in PTY byte order.
    #[serde(rename = "terminal:data")]
    TerminalData { data: String },
    /// Batched workspace changes; receipt means "re-fetch the tree".
    #[serde(rename = "fs-event")]
    FsEvent { data: Vec<FsChange> },
    /// The shell exited; no more terminal:data will follow.
    #[serde(rename = "terminal:exit")]
    TerminalExit,
}

/// Create WebSocket routes.
pub fn websocket_routes(state: AppState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection: spawn its terminal, bridge both directions, tear
/// everything down when either side ends.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut session = match state.terminals.open(state.store.root()) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "failed to start terminal session");
            return;
        }
    };
    let Some(output) = session.take_output() else {
        error!("terminal session output already taken");
        return;
    };
    let session = Arc::new(session);
    let session_id = session.id();
    info!(session_id = %session_id, "websocket connected");

    let (sender, receiver) = socket.split();
    let fs_rx = state.fs_events.subscribe();

    let mut send_task = tokio::spawn(send_loop(sender, output, fs_rx, session_id));
    let mut recv_task = tokio::spawn(recv_loop(receiver, Arc::clone(&session), session_id));

    tokio::select! {
        _ = &mut send_task => {
            debug!(session_id = %session_id, "send task finished");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!(session_id = %session_id, "receive task finished");
            send_task.abort();
        }
    }

    // Closing reaps the shell; do the (briefly) blocking part off the
    // async workers.
    let terminals = Arc::clone(&state.terminals);
    let _ = tokio::task::spawn_blocking(move || terminals.close(session_id)).await;

    info!(session_id = %session_id, "websocket disconnected");
}

/// Forward PTY output and fs-event batches to the client.
async fn send_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut output: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
    mut fs_rx: broadcast::Receiver<Vec<FsChange>>,
    session_id: Uuid,
) {
    loop {
        tokio::select! {
            chunk = output.recv() => match chunk {
                Some(bytes) => {
                    let message = ServerMessage::TerminalData {
                        data: String::from_utf8_lossy(&bytes).into_owned(),
                    };
                    if send_json(&mut sender, &message).await.is_err() {
                        break;
                    }
                }
                None => {
                    debug!(session_id = %session_id, "shell exited");
                    let _ = send_json(&mut sender, &ServerMessage::TerminalExit).await;
                    break;
                }
            },
            batch = fs_rx.recv() => match batch {
                Ok(changes) => {
                    let message = ServerMessage::FsEvent { data: changes };
                    if send_json(&mut sender, &message).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The client re-fetches the whole tree on any fs-event,
                    // so dropped batches only cost one extra refresh.
                    warn!(session_id = %session_id, skipped, "fs-event consumer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Apply client messages to the terminal session.
async fn recv_loop(mut receiver: SplitStream<WebSocket>, session: Arc<TermSession>, session_id: Uuid) {
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::TerminalWrite { data }) => {
                    if let Err(e) = session.write(data.as_bytes()) {
                        debug!(session_id = %session_id, error = %e, "terminal write failed");
                        break;
                    }
                }
                Ok(ClientMessage::TerminalResize { cols, rows }) => {
                    if let Err(e) = session.resize(cols, rows) {
                        debug!(session_id = %session_id, error = %e, "terminal resize failed");
                    }
                }
                Err(e) => {
                    debug!(session_id = %session_id, error = %e, "ignoring malformed client message");
                }
            },
            Message::Close(_) => {
                debug!(session_id = %session_id, "client closed connection");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            _ => {}
        }
    }
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            error!(error = %e, "failed to serialize server message");
            Ok(())
        }
    }
}
