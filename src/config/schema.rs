//! KDL schema for config.kdl.
//!
//! ```kdl
//! database "/var/lib/bearing/bearing.db"
//! server {
//!     host "0.0.0.0"
//!     port 8080
//!     cors-origin "https://okr.example.com"
//! }
//! llm {
//!     provider "anthropic"  // or "mock"
//!     model "claude-sonnet-4-20250514"
//!     timeout-secs 60
//! }
//! log {
//!     level "bearing=debug"
//!     file "/var/log/bearing.log"
//! }
//! ```
//!
//! The Anthropic API key is not part of the schema; it is only
//! read from the environment.

use std::path::{Path, PathBuf};

use kdl::{KdlDocument, KdlNode};
use serde::Serialize;

use crate::{Error, Result};

/// Which LLM backend the advisory endpoints use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Anthropic when an API key is available, otherwise the mock
    #[default]
    Auto,
    Anthropic,
    Mock,
}

impl LlmBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(LlmBackend::Auto),
            "anthropic" => Some(LlmBackend::Anthropic),
            "mock" => Some(LlmBackend::Mock),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::Auto => "auto",
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::Mock => "mock",
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Allowed CORS origins; repeat the node for several
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmSection {
    pub provider: Option<LlmBackend>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSection {
    /// `EnvFilter` directive, e.g. "info" or "bearing=debug"
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

/// Settings read from config.kdl. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BearingConfig {
    pub database: Option<PathBuf>,
    pub server: ServerSection,
    pub llm: LlmSection,
    pub log: LogSection,
}

fn string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries().first().and_then(|e| e.value().as_integer())
}

impl BearingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config document, rejecting values of the wrong shape.
    ///
    /// Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        let mut config = Self::new();

        for node in doc.nodes() {
            match node.name().value() {
                "database" => config.database = string_arg(node).map(PathBuf::from),
                "server" => {
                    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
                        match child.name().value() {
                            "host" => config.server.host = string_arg(child),
                            "port" => {
                                let port = integer_arg(child)
                                    .and_then(|p| u16::try_from(p).ok())
                                    .filter(|p| *p > 0)
                                    .ok_or_else(|| {
                                        Error::Config("server port must be 1-65535".to_string())
                                    })?;
                                config.server.port = Some(port);
                            }
                            "cors-origin" => {
                                if let Some(origin) = string_arg(child) {
                                    config.server.cors_origins.push(origin);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                "llm" => {
                    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
                        match child.name().value() {
                            "provider" => {
                                let raw = string_arg(child).unwrap_or_default();
                                let backend = LlmBackend::parse(&raw).ok_or_else(|| {
                                    Error::Config(format!(
                                        "llm provider must be auto, anthropic or mock, got '{}'",
                                        raw
                                    ))
                                })?;
                                config.llm.provider = Some(backend);
                            }
                            "model" => config.llm.model = string_arg(child),
                            "timeout-secs" => {
                                let secs = integer_arg(child)
                                    .and_then(|s| u64::try_from(s).ok())
                                    .filter(|s| *s > 0)
                                    .ok_or_else(|| {
                                        Error::Config(
                                            "llm timeout-secs must be a positive integer".to_string(),
                                        )
                                    })?;
                                config.llm.timeout_secs = Some(secs);
                            }
                            _ => {}
                        }
                    }
                }
                "log" => {
                    for child in node.children().map(|c| c.nodes()).unwrap_or_default() {
                        match child.name().value() {
                            "level" => config.log.level = string_arg(child),
                            "file" => config.log.file = string_arg(child).map(PathBuf::from),
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// Load config.kdl. A missing file yields the empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let doc: KdlDocument = content
            .parse()
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        Self::from_kdl(&doc)
    }
}
