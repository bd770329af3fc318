//! SubTerm backend server.
//!
//! Serves the browser IDE's file, tree and import endpoints over HTTP and
//! bridges terminal I/O plus workspace change notifications over a
//! WebSocket, backed by the `subterm-workspace` and `subterm-term` crates.

pub mod api;

/// Crate version, reported on `/health`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
