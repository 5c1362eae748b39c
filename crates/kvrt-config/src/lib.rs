#![deny(unsafe_code)]

//! Configuration loading and validation for kvrt.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure shared by the daemon and the client.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default Unix socket path for the control-plane socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/kvrt.sock";

/// Default size of the single read buffer used for one message.
pub const DEFAULT_MESSAGE_BYTES: usize = 8192;

/// Upper bound accepted for any configured message buffer.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Length limit of `sockaddr_un.sun_path`, including the terminating NUL.
pub const SOCKET_PATH_LIMIT: usize = 108;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Daemon (server role) configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Client role configuration.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Filesystem path of the Unix domain socket.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,

    /// Size of the per-connection read buffer. One read of at most this
    /// many bytes is treated as the whole request.
    #[serde(default = "default_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_message_bytes: default_message_bytes(),
        }
    }
}

/// Configuration for the one-shot client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Size of the buffer the response is collected into.
    #[serde(default = "default_message_bytes")]
    pub response_buffer_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_buffer_bytes: default_message_bytes(),
        }
    }
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_message_bytes() -> usize {
    DEFAULT_MESSAGE_BYTES
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_socket_path(&self.daemon.socket_path)?;
        validate_buffer("daemon.max_message_bytes", self.daemon.max_message_bytes)?;
        validate_buffer(
            "client.response_buffer_bytes",
            self.client.response_buffer_bytes,
        )?;
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured socket path.
    pub fn socket_path(&self) -> PathBuf {
        PathBuf::from(&self.daemon.socket_path)
    }

    /// Replace the socket path, re-validating it.
    pub fn set_socket_path(&mut self, path: impl Into<String>) -> Result<(), ConfigError> {
        let path = path.into();
        validate_socket_path(&path)?;
        self.daemon.socket_path = path;
        Ok(())
    }
}

fn validate_socket_path(path: &str) -> Result<(), ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::Validation(
            "daemon.socket_path must not be empty".to_string(),
        ));
    }
    if path.len() >= SOCKET_PATH_LIMIT {
        return Err(ConfigError::Validation(format!(
            "daemon.socket_path must be shorter than {SOCKET_PATH_LIMIT} bytes, got {}",
            path.len()
        )));
    }
    if path.contains('\0') {
        return Err(ConfigError::Validation(
            "daemon.socket_path must not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}

fn validate_buffer(name: &str, size: usize) -> Result<(), ConfigError> {
    if size == 0 || size > MAX_MESSAGE_BYTES {
        return Err(ConfigError::Validation(format!(
            "{name} must be in 1..={MAX_MESSAGE_BYTES}, got {size}"
        )));
    }
    Ok(())
}
