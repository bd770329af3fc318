//! HTTP and WebSocket API.

pub mod error;
pub mod routes;
pub mod server;
pub mod websocket;

pub use error::ApiError;
pub use routes::AppState;
