//! Runtime configuration for Bearing.
//!
//! Settings live in an optional `config.kdl` (default
//! `~/.config/bearing/config.kdl`, overridable with `-c/--config` or
//! `BEARING_CONFIG`). See [`schema`] for the file format.
//!
//! ## Precedence
//!
//! CLI flag > environment variable > config.kdl > built-in default.
//! Use the [`resolver`] module for unified precedence resolution.

pub mod resolver;
pub mod schema;

pub use resolver::{
    API_KEY_ENV, ConfigOverrides, DB_ENV, Resolved, ResolvedConfig, ResolvedLlm, ValueSource,
    default_config_path, default_database_path, resolve_config, resolve_with,
};
pub use schema::{BearingConfig, LlmBackend};
