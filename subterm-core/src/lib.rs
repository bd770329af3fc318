//! Core types and abstractions for the SubTerm backend.
//!
//! This crate provides the error type, the configuration system and the
//! shared wire types used across all SubTerm components.

pub mod config;
pub mod error;
pub mod events;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{ChangeKind, FsChange};
