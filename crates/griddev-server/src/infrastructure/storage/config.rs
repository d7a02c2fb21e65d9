//! TOML-based configuration for the server process.
//!
//! The file is optional.  When `--config` points at a file that does not
//! exist, every setting falls back to its default, so a client can start the
//! server with nothing but `--port`.
//!
//! ```toml
//! [network]
//! port = 8011
//! bind_address = "127.0.0.1"
//! no_delay = true
//!
//! [server]
//! log_level = "info"
//! output_dir = "/var/tmp/plots"
//! ```
//!
//! Command-line flags override values read from the file; see `main.rs`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use griddev_core::SERVER_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

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

    #[error("invalid bind address {0:?}")]
    BindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub server: ServerSection,
}

/// Listening socket settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// TCP port for the HTTP endpoint.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Address to bind.  Only loopback makes sense for a companion process.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Disable Nagle's algorithm on accepted connections.
    #[serde(default)]
    pub no_delay: bool,
}

/// General server behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory that relative image file names are resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

fn default_port() -> u16 {
    SERVER_PORT
}
fn default_bind_address() -> String {
    Ipv4Addr::LOCALHOST.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            no_delay: false,
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            output_dir: None,
        }
    }
}

impl NetworkConfig {
    /// Socket address the server listens on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindAddress`] if `bind_address` is not an IP.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads `ServerConfig` from `path`, returning the defaults when the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses configuration text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_listens_on_loopback_8011() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.network.port, 8011);
        assert_eq!(
            cfg.network.socket_addr().unwrap(),
            "127.0.0.1:8011".parse().unwrap()
        );
        assert!(!cfg.network.no_delay);
        assert_eq!(cfg.server.log_level, "info");
    }

    #[test]
    fn test_partial_file_keeps_remaining_defaults() {
        let cfg = parse_config("[network]\nport = 9000\n").unwrap();
        assert_eq!(cfg.network.port, 9000);
        assert_eq!(cfg.network.bind_address, "127.0.0.1");
        assert_eq!(cfg.server, ServerSection::default());
    }

    #[test]
    fn test_output_dir_is_read() {
        let cfg = parse_config("[server]\noutput_dir = \"/tmp/plots\"\nlog_level = \"debug\"\n").unwrap();
        assert_eq!(cfg.server.output_dir, Some(PathBuf::from("/tmp/plots")));
        assert_eq!(cfg.server.log_level, "debug");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = parse_config("[network\nport = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("griddev-no-such-config.toml");
        assert_eq!(load_config(&path).unwrap(), ServerConfig::default());
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let network = NetworkConfig {
            bind_address: "localhost:1".to_string(),
            ..NetworkConfig::default()
        };
        assert!(matches!(network.socket_addr(), Err(ConfigError::BindAddress(_))));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut cfg = ServerConfig::default();
        cfg.network.no_delay = true;
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(parse_config(&text).unwrap(), cfg);
    }
}
