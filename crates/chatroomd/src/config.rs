//! Server configuration.
//!
//! Values are layered, lowest precedence first:
//!
//! 1. Built-in defaults ([`ServerConfig::default`])
//! 2. An optional TOML file, every key optional
//! 3. The `CHATROOM_ADDR` environment variable (`host:port`)
//! 4. Command-line flags, applied by the binary on the returned value
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 9000
//! idle_timeout_secs = 120
//! max_line_bytes = 4096
//! write_timeout_secs = 5
//! ```

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the listen address.
pub const ADDR_ENV_VAR: &str = "CHATROOM_ADDR";

/// Default listen host (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8888;

/// Default idle timeout before eviction (60 seconds)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum inbound line length (64 KiB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

/// Default socket write timeout (10 seconds)
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config file {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid listen address {addr:?}: {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("Invalid {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

/// Effective server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// IP address to listen on
    pub host: String,

    /// TCP port to listen on (0 picks a free port)
    pub port: u16,

    /// Silence after which a session is evicted
    pub idle_timeout: Duration,

    /// Longest accepted inbound line, terminator excluded
    pub max_line_bytes: usize,

    /// Upper bound on a single socket write
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// On-disk representation; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    host: Option<String>,
    port: Option<u16>,
    idle_timeout_secs: Option<u64>,
    max_line_bytes: Option<usize>,
    write_timeout_secs: Option<u64>,
}

impl ServerConfig {
    /// Builds a configuration from defaults, an optional TOML file and an
    /// optional `host:port` override (normally the value of
    /// [`ADDR_ENV_VAR`]).
    ///
    /// The result is not validated; call [`ServerConfig::validate`] after
    /// applying any further overrides.
    pub fn load(file: Option<&Path>, env_addr: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = file {
            let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
            let parsed: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;
            config.apply_file(parsed);
            debug!(path = %path.display(), "Loaded config file");
        }

        if let Some(addr) = env_addr {
            config.apply_addr(addr)?;
            debug!(addr, "Applied listen address override");
        }

        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(secs) = file.idle_timeout_secs {
            self.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = file.max_line_bytes {
            self.max_line_bytes = bytes;
        }
        if let Some(secs) = file.write_timeout_secs {
            self.write_timeout = Duration::from_secs(secs);
        }
    }

    /// Replaces host and port from a `host:port` string.
    pub fn apply_addr(&mut self, addr: &str) -> Result<(), ConfigError> {
        let parsed: SocketAddr = addr.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidAddress {
                addr: addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.host = parsed.ip().to_string();
        self.port = parsed.port();
        Ok(())
    }

    /// The socket address to bind.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidAddress {
                addr: self.host.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Checks that the settings can actually run a server.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        if self.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "idle_timeout",
                reason: "must be greater than zero",
            });
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "write_timeout",
                reason: "must be greater than zero",
            });
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_line_bytes",
                reason: "must be greater than zero",
            });
        }

        Ok(())
    }
}
