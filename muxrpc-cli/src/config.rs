//! CLI configuration.
//!
//! Configuration is resolved in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via MUXRPC_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags (applied in main)

use muxrpc_client::{ConnectionConfig, TlsClientConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Address of the remote node.
    #[serde(with = "socket_addr_serde")]
    pub server: SocketAddr,
    /// Per-call timeout in milliseconds.
    pub call_timeout_ms: u64,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Socket read buffer size in bytes.
    pub read_buffer_size: usize,
    /// TLS settings.
    pub tls: TlsSection,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            server: SocketAddr::from(([127, 0, 0, 1], muxrpc_protocol::DEFAULT_PORT)),
            call_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            read_buffer_size: 64 * 1024,
            tls: TlsSection::default(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from `path` (or MUXRPC_CONFIG), then applies
    /// environment variable overrides.
    ///
    /// The result is not validated: command-line flags still apply on top, so
    /// call [`CliConfig::validate`] once they have.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("MUXRPC_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Applies overrides from an environment-like lookup.
    ///
    /// Unparseable values are ignored, leaving the previous setting.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = var("MUXRPC_ADDR") {
            if let Ok(parsed) = addr.parse() {
                self.server = parsed;
            }
        }

        if let Some(ms) = var("MUXRPC_CALL_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.call_timeout_ms = ms;
            }
        }

        if let Some(ms) = var("MUXRPC_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                self.connect_timeout_ms = ms;
            }
        }

        if let Some(tls) = var("MUXRPC_TLS") {
            self.tls.enabled = tls == "1" || tls.to_lowercase() == "true";
        }

        if let Some(path) = var("MUXRPC_CA_CERT") {
            self.tls.ca_cert = Some(PathBuf::from(path));
            self.tls.enabled = true;
        }
    }

    /// Checks settings that cannot work together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.tls.client_cert.is_some() != self.tls.client_key.is_some() {
            return Err(ConfigError::ValidationError(
                "tls.client_cert and tls.client_key must be set together".to_string(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Builds the client connection configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.server)
            .with_call_timeout(self.call_timeout())
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
            .with_read_buffer_size(self.read_buffer_size);
        if self.tls.enabled {
            config = config.with_tls(self.tls.client_config());
        }
        config
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub enabled: bool,
    /// CA certificate(s) used to verify the node.
    pub ca_cert: Option<PathBuf>,
    /// Client certificate for mTLS.
    pub client_cert: Option<PathBuf>,
    /// Client private key for mTLS.
    pub client_key: Option<PathBuf>,
    /// Skip certificate verification (INSECURE).
    pub insecure: bool,
    /// Server name for SNI.
    pub server_name: Option<String>,
}

impl TlsSection {
    fn client_config(&self) -> TlsClientConfig {
        TlsClientConfig {
            enabled: self.enabled,
            ca_cert_path: self.ca_cert.clone(),
            client_cert_path: self.client_cert.clone(),
            client_key_path: self.client_key.clone(),
            insecure: self.insecure,
            server_name: self.server_name.clone(),
        }
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Serde module for SocketAddr (kept as a string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
