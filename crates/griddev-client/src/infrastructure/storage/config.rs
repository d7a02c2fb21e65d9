//! TOML-based configuration for a client session.
//!
//! ```toml
//! port = 8011
//! server_executable = "/usr/local/bin/griddev-server"
//!
//! [retry]
//! attempts = 3
//! connect_timeout_ms = 2000
//! retry_delay_ms = 1000
//! warm_up_ms = 500
//! ```
//!
//! Every field is optional.  When `server_executable` is absent the session
//! looks for the binary itself; see
//! [`locate_server_executable`](crate::infrastructure::supervisor::locate_server_executable).

use std::path::{Path, PathBuf};
use std::time::Duration;

use griddev_core::SERVER_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::supervisor::RetryPolicy;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Client session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Loopback port the server listens on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Explicit path to the server binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_executable: Option<PathBuf>,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Supervisor timings, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_warm_up_ms")]
    pub warm_up_ms: u64,
}

fn default_port() -> u16 {
    SERVER_PORT
}
fn default_attempts() -> u32 {
    3
}
fn default_connect_timeout_ms() -> u64 {
    2_000
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_warm_up_ms() -> u64 {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            server_executable: None,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            warm_up_ms: default_warm_up_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            warm_up: Duration::from_millis(self.warm_up_ms),
        }
    }
}

/// Loads `ClientConfig` from `path`, returning the defaults when the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
