//! Shared helpers for driving a real server over TCP.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chatroomd::config::ServerConfig;
use chatroomd::directory::{spawn_directory, DirectoryHandle};
use chatroomd::server::{ChatServer, ServerError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Maximum time to wait for an expected line
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

/// How long a client must stay silent to count as "nothing arrived"
pub const QUIET_PERIOD: Duration = Duration::from_millis(150);

/// Maximum time for the server to finish after cancellation
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Test Server
// ============================================================================

/// Loopback config on an ephemeral port with a long idle timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        idle_timeout: Duration::from_secs(30),
        max_line_bytes: 1024,
        write_timeout: Duration::from_secs(2),
    }
}

/// A running server that is cancelled when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    pub directory: DirectoryHandle,
    cancel_token: CancellationToken,
    task: Option<JoinHandle<Result<(), ServerError>>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: ServerConfig) -> Self {
        let directory = spawn_directory();
        let cancel_token = CancellationToken::new();

        let server = ChatServer::bind(&config, directory.clone(), cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr();
        let task = tokio::spawn(server.run());

        Self {
            addr,
            directory,
            cancel_token,
            task: Some(task),
        }
    }

    /// Cancels the server and waits for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            let result = timeout(SHUTDOWN_TIMEOUT, task)
                .await
                .expect("server did not stop in time")
                .expect("server task panicked");
            assert!(result.is_ok());
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

// ============================================================================
// Test Client
// ============================================================================

/// A line-oriented TCP client, as `nc` would be.
pub struct TestClient {
    /// Local address, which the server sees as the peer address
    pub address: SocketAddr,

    /// Current display name as the server knows it
    pub name: String,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl TestClient {
    /// Connects without waiting for anything.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        // The server names a new session after the peer address
        let address = stream.local_addr().expect("local addr");
        let (reader, writer) = stream.into_split();

        Self {
            address,
            name: address.to_string(),
            lines: BufReader::new(reader).lines(),
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Connects and waits for this client's own online notice.
    pub async fn join(server: &TestServer) -> Self {
        let mut client = Self::connect(server.addr).await;
        let online = format!("{} online now", client.name);
        client.expect_line(&online).await;
        client
    }

    /// Renames and waits for the confirmation.
    pub async fn rename(&mut self, name: &str) {
        self.send(&format!("rename|{name}")).await;
        self.expect_line(&format!("You has updated your name to \"{name}\""))
            .await;
        self.name = name.to_string();
    }

    pub async fn send(&self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes()).await;
    }

    pub async fn send_raw(&self, bytes: &[u8]) {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await.expect("write");
        writer.flush().await.expect("flush");
    }

    /// Next line; fails on timeout or end of stream.
    pub async fn recv(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for line")
            .expect("read failed")
            .expect("unexpected end of stream")
    }

    /// Skips lines until `expected` arrives.
    pub async fn expect_line(&mut self, expected: &str) {
        loop {
            let line = self.recv().await;
            if line == expected {
                return;
            }
        }
    }

    /// Reads everything left until the server closes the connection.
    pub async fn recv_until_eof(&mut self) -> Vec<String> {
        let mut remaining = Vec::new();
        loop {
            match timeout(RECV_TIMEOUT, self.lines.next_line())
                .await
                .expect("connection was not closed in time")
            {
                Ok(Some(line)) => remaining.push(line),
                // A reset counts as closed too
                Ok(None) | Err(_) => return remaining,
            }
        }
    }

    /// Asserts nothing arrives for a short while.
    pub async fn assert_quiet(&mut self) {
        let result = timeout(QUIET_PERIOD, self.lines.next_line()).await;
        assert!(result.is_err(), "unexpected input: {result:?}");
    }

    /// Sends a blank line every `period` until the connection breaks.
    pub fn spawn_keepalive(&self, period: Duration) -> JoinHandle<()> {
        let writer = Arc::clone(&self.writer);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let mut writer = writer.lock().await;
                if writer.write_all(b"\n").await.is_err() {
                    return;
                }
            }
        })
    }
}
