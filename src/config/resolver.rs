//! Precedence resolution for runtime settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags
//! 2. Environment variables (`BEARING_DB`, `BEARING_HOST`, `BEARING_PORT`, ...)
//! 3. config.kdl
//! 4. Built-in defaults
//!
//! The Anthropic API key has no CLI flag or file entry: it comes from
//! `ANTHROPIC_API_KEY` or not at all.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::schema::{BearingConfig, LlmBackend};
use crate::ai::provider::{DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::{Error, Result};

pub const DB_ENV: &str = "BEARING_DB";
pub const HOST_ENV: &str = "BEARING_HOST";
pub const PORT_ENV: &str = "BEARING_PORT";
pub const CONFIG_ENV: &str = "BEARING_CONFIG";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const MODEL_ENV: &str = "ANTHROPIC_MODEL";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    CliFlag,
    EnvVar(String),
    ConfigFile,
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// CLI overrides for resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }
}

/// LLM settings after resolution. The key itself never leaves this struct
/// in serialized form.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLlm {
    pub provider: Resolved<LlmBackend>,
    pub model: Resolved<String>,
    pub timeout_secs: Resolved<u64>,
    #[serde(skip)]
    pub api_key: Option<String>,
    pub api_key_set: bool,
}

/// Fully resolved settings with source tracking.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    /// The config.kdl that was consulted (it may not exist)
    pub config_path: PathBuf,
    pub database: Resolved<PathBuf>,
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    pub cors_origins: Vec<String>,
    pub llm: ResolvedLlm,
    pub log_level: Resolved<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Default config.kdl location: `~/.config/bearing/config.kdl`.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bearing")
        .join("config.kdl")
}

/// Default database location: `~/.local/share/bearing/bearing.db`.
pub fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bearing")
        .join("bearing.db")
}

fn pick<T>(
    cli: Option<T>,
    env: Option<(T, &str)>,
    file: Option<T>,
    default: impl FnOnce() -> T,
) -> Resolved<T> {
    if let Some(v) = cli {
        Resolved::new(v, ValueSource::CliFlag)
    } else if let Some((v, name)) = env {
        Resolved::new(v, ValueSource::EnvVar(name.to_string()))
    } else if let Some(v) = file {
        Resolved::new(v, ValueSource::ConfigFile)
    } else {
        Resolved::new(default(), ValueSource::Default)
    }
}

/// Resolve settings from an already-loaded file and an environment lookup.
pub fn resolve_with(
    config_path: PathBuf,
    file: &BearingConfig,
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    let env_port = match var(PORT_ENV) {
        Some(raw) => Some(
            raw.trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| Error::Config(format!("{} must be a port number, got '{}'", PORT_ENV, raw)))?,
        ),
        None => None,
    };

    let api_key = var(API_KEY_ENV);
    let provider = match file.llm.provider {
        Some(backend) => Resolved::new(backend, ValueSource::ConfigFile),
        None => Resolved::new(LlmBackend::Auto, ValueSource::Default),
    };
    if provider.value == LlmBackend::Anthropic && api_key.is_none() {
        return Err(Error::Config(format!(
            "llm provider is anthropic but {} is not set",
            API_KEY_ENV
        )));
    }

    Ok(ResolvedConfig {
        config_path,
        database: pick(
            overrides.database.clone(),
            var(DB_ENV).map(|v| (PathBuf::from(v), DB_ENV)),
            file.database.clone(),
            default_database_path,
        ),
        host: pick(
            overrides.host.clone(),
            var(HOST_ENV).map(|v| (v, HOST_ENV)),
            file.server.host.clone(),
            || DEFAULT_HOST.to_string(),
        ),
        port: pick(
            overrides.port,
            env_port.map(|p| (p, PORT_ENV)),
            file.server.port,
            || DEFAULT_PORT,
        ),
        cors_origins: file.server.cors_origins.clone(),
        llm: ResolvedLlm {
            provider,
            model: pick(
                None,
                var(MODEL_ENV).map(|v| (v, MODEL_ENV)),
                file.llm.model.clone(),
                || DEFAULT_MODEL.to_string(),
            ),
            timeout_secs: pick(None, None, file.llm.timeout_secs, || DEFAULT_TIMEOUT_SECS),
            api_key_set: api_key.is_some(),
            api_key,
        },
        log_level: pick(
            None,
            None,
            file.log.level.clone(),
            || DEFAULT_LOG_LEVEL.to_string(),
        ),
        log_file: file.log.file.clone(),
    })
}

/// Resolve settings from the process environment and the config file named
/// by the overrides, `BEARING_CONFIG`, or the default location.
pub fn resolve_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let env = |name: &str| std::env::var(name).ok();
    let config_path = overrides
        .config_path
        .clone()
        .or_else(|| env(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(default_config_path);
    let file = load_file(&config_path, overrides.config_path.is_some())?;
    resolve_with(config_path, &file, overrides, env)
}

/// An explicitly requested config file must exist.
fn load_file(path: &Path, explicit: bool) -> Result<BearingConfig> {
    if explicit && !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    BearingConfig::load(path)
}
