//! Bearing - goal alignment and progress rollup for OKR tracking.
//!
//! This library provides the core functionality for the `bearing` CLI and its
//! embedded HTTP API, including measure progress math, goal status rollup,
//! the goal alignment graph and the team tree.

pub mod ai;
pub mod cli;
pub mod commands;
pub mod config;
pub mod import;
pub mod logging;
pub mod models;
pub mod period;
pub mod reports;
pub mod server;
pub mod storage;


/// Library-level error type for Bearing operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// The operation is valid in form but blocked by existing state.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Insufficient permissions")]
    Forbidden,

    /// An upstream service (the LLM provider) failed.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Bearing operations.
pub type Result<T> = std::result::Result<T, Error>;
