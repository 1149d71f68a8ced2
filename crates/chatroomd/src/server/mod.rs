//! TCP server for the chat daemon.
//!
//! The server:
//! - Listens on a TCP socket for client connections
//! - Spawns a ConnectionHandler for each client
//! - Owns the broadcast bus fan-out task
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│ DirectoryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ publish
//!         ▼
//! ┌─────────────────┐
//! │  BroadcastBus   │
//! │   (fan-out)     │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod connection;
mod watchdog;

pub use connection::{
    read_line_bounded, read_lines, ConnectionError, ConnectionHandler, ConnectionLimits,
};
pub use watchdog::{activity_channel, watch_idle, IdleOutcome};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use chatroom_core::SessionId;

use crate::bus::spawn_bus;
use crate::config::{ConfigError, ServerConfig};
use crate::directory::DirectoryHandle;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// TCP server for the chat daemon.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Limits handed to every connection
    limits: ConnectionLimits,

    /// Handle to the online-user directory
    directory: DirectoryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating session ids
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` if the configured address is invalid
    /// and `ServerError::Bind` if the socket cannot be bound.
    pub async fn bind(
        config: &ServerConfig,
        directory: DirectoryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.listen_addr()?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr,
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            limits: ConnectionLimits::from(config),
            directory,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every connection to take its session offline.
    pub async fn run(self) -> Result<(), ServerError> {
        let bus = spawn_bus(self.directory.clone(), self.cancel_token.clone());

        info!(addr = %self.local_addr, "Chat server listening");

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                // Reap finished connections so the set does not grow
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = result {
                        error!(error = %e, "Connection task failed");
                    }
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, address)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            let handler = ConnectionHandler::new(
                                stream,
                                address,
                                SessionId::new(conn_num),
                                self.directory.clone(),
                                bus.clone(),
                                self.limits,
                                self.cancel_token.child_token(),
                            );
                            connections.spawn(handler.run());
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        drop(self.listener);

        let remaining = connections.len();
        if remaining > 0 {
            debug!(remaining, "Waiting for connections to close");
        }
        while let Some(result) = connections.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Connection task failed");
            }
        }

        info!("Chat server stopped");
        Ok(())
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::spawn_directory;

    fn loopback_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_bind_resolves_ephemeral_port() {
        let server = ChatServer::bind(&loopback_config(), spawn_directory(), CancellationToken::new())
            .await
            .unwrap();

        assert_ne!(server.local_addr().port(), 0);
        assert!(server.local_addr().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = ChatServer::bind(&loopback_config(), spawn_directory(), CancellationToken::new())
            .await
            .unwrap();

        let taken = ServerConfig {
            port: first.local_addr().port(),
            ..loopback_config()
        };
        let result = ChatServer::bind(&taken, spawn_directory(), CancellationToken::new()).await;

        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_invalid_host_is_config_error() {
        let config = ServerConfig {
            host: "not-an-ip".to_string(),
            ..loopback_config()
        };
        let result = ChatServer::bind(&config, spawn_directory(), CancellationToken::new()).await;

        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_returns_after_cancel() {
        let cancel_token = CancellationToken::new();
        let server = ChatServer::bind(&loopback_config(), spawn_directory(), cancel_token.clone())
            .await
            .unwrap();

        let running = tokio::spawn(server.run());
        cancel_token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
