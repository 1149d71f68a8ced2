//! chatroomd - line-oriented multi-user TCP chat server
//!
//! Clients connect with any line-based TCP tool (`nc`, `telnet`) and chat
//! with everyone online, or privately with `to|name|message`.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:8888
//! chatroomd
//!
//! # Custom address and idle timeout
//! chatroomd --host 127.0.0.1 --port 9000 --idle-timeout-secs 60
//!
//! # Settings from a file, overridden by the environment
//! CHATROOM_ADDR=127.0.0.1:9000 chatroomd --config chatroom.toml
//! ```
//!
//! Runs in the foreground until SIGINT or SIGTERM.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatroomd::config::{ServerConfig, ADDR_ENV_VAR};
use chatroomd::directory::spawn_directory;
use chatroomd::server::ChatServer;

/// Multi-user TCP chat server
#[derive(Parser, Debug)]
#[command(name = "chatroomd", version, about)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// IP address to listen on
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Seconds of silence before a client is evicted
    #[arg(long)]
    idle_timeout_secs: Option<u64>,
}

impl Args {
    /// Defaults, then the config file, then `CHATROOM_ADDR`, then flags.
    fn server_config(&self) -> Result<ServerConfig> {
        let env_addr = env::var(ADDR_ENV_VAR).ok();
        let mut config = ServerConfig::load(self.config.as_deref(), env_addr.as_deref())?;

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.idle_timeout_secs {
            config.idle_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chatroomd=info".parse()?))
        .init();

    let config = args.server_config().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.host,
        port = config.port,
        idle_timeout_secs = config.idle_timeout.as_secs(),
        max_line_bytes = config.max_line_bytes,
        "Chat server starting"
    );

    let cancel_token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel_token.clone()));

    let server = ChatServer::bind(&config, spawn_directory(), cancel_token)
        .await
        .context("Failed to start server")?;

    server.run().await.context("Server error")?;

    info!("Chat server stopped");
    Ok(())
}

/// Cancels `cancel_token` on the first SIGINT or SIGTERM.
async fn cancel_on_signal(cancel_token: CancellationToken) {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!(error = %e, "Cannot listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        }

        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    };

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    cancel_token.cancel();
}
