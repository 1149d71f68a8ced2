//! Connection handler for individual TCP clients.
//!
//! Each accepted socket gets its own `ConnectionHandler` that:
//! - Creates the session and its mailbox drain task
//! - Registers the session and announces it
//! - Reads and dispatches inbound lines
//! - Evicts the session when it stays silent for the idle timeout
//! - Takes the session offline however the connection ends
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chatroom_core::SessionId;

use super::watchdog::{activity_channel, watch_idle, IdleOutcome};
use crate::bus::BroadcastBus;
use crate::config::ServerConfig;
use crate::directory::DirectoryHandle;
use crate::session::{drain_mailbox, Mailbox, Session};

/// Timing and size limits applied to one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Silence after which the session is evicted
    pub idle_timeout: Duration,

    /// Longest accepted inbound line, terminator excluded
    pub max_line_bytes: usize,

    /// Upper bound on a single socket write
    pub write_timeout: Duration,
}

impl From<&ServerConfig> for ConnectionLimits {
    fn from(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout,
            max_line_bytes: config.max_line_bytes,
            write_timeout: config.write_timeout,
        }
    }
}

/// Connection handler for a single client.
pub struct ConnectionHandler {
    /// Accepted socket
    stream: TcpStream,

    /// Remote address of the client
    address: SocketAddr,

    /// Identifier for this connection
    id: SessionId,

    /// Handle to the online-user directory
    directory: DirectoryHandle,

    /// Shared public channel
    bus: BroadcastBus,

    /// Per-connection limits
    limits: ConnectionLimits,

    /// Fires on server shutdown or when this connection must stop
    cancel_token: CancellationToken,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// `cancel_token` should be a child of the server's token so shutdown
    /// reaches every connection.
    pub fn new(
        stream: TcpStream,
        address: SocketAddr,
        id: SessionId,
        directory: DirectoryHandle,
        bus: BroadcastBus,
        limits: ConnectionLimits,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            stream,
            address,
            id,
            directory,
            bus,
            limits,
            cancel_token,
        }
    }

    /// Runs the connection to completion.
    ///
    /// Returns once the session is offline and everything queued for it has
    /// been written (or the socket gave up).
    pub async fn run(self) {
        let Self {
            stream,
            address,
            id,
            directory,
            bus,
            limits,
            cancel_token,
        } = self;

        debug!(session_id = %id, addr = %address, "Client connected");

        let (read_half, write_half) = stream.into_split();
        let (mailbox, receiver) = Mailbox::channel();

        // The drain ends when the mailbox closes or the socket fails; either
        // way the reader has nothing left to do.
        let drain_token = cancel_token.clone();
        let drain = tokio::spawn(async move {
            drain_mailbox(id, receiver, write_half, limits.write_timeout).await;
            drain_token.cancel();
        });

        let session = Arc::new(Session::new(id, address, mailbox, directory, bus));
        // A failed registration is logged inside; the client stays connected
        let _ = session.go_online().await;

        let (activity_tx, mut activity_rx) = activity_channel();
        let reader = tokio::spawn(read_lines(
            Arc::clone(&session),
            BufReader::new(read_half),
            activity_tx,
            limits.max_line_bytes,
            cancel_token.clone(),
        ));

        if watch_idle(&mut activity_rx, limits.idle_timeout).await == IdleOutcome::TimedOut {
            info!(
                session_id = %id,
                idle_secs = limits.idle_timeout.as_secs(),
                "Evicting idle session"
            );
            session.evict().await;
            cancel_token.cancel();
        }

        match reader.await {
            Ok(Ok(())) => {}
            Ok(Err(ConnectionError::MessageTooLarge { size, max })) => {
                warn!(session_id = %id, size, max, "Inbound line too long, closing connection");
            }
            Ok(Err(e)) => {
                debug!(session_id = %id, error = %e, "Connection read failed");
            }
            Err(e) => {
                error!(session_id = %id, error = %e, "Reader task failed");
            }
        }

        session.go_offline().await;

        if let Err(e) = drain.await {
            error!(session_id = %id, error = %e, "Mailbox drain task failed");
        }

        debug!(session_id = %id, addr = %address, "Client disconnected");
    }
}

/// Reads lines until EOF, a transport error or cancellation, dispatching
/// each one to the session.
///
/// Every line, blank or not, counts as activity for the idle watchdog once
/// it has been dispatched.
/// End of stream takes the session offline right away.
pub async fn read_lines<R>(
    session: Arc<Session>,
    mut reader: R,
    activity: mpsc::Sender<()>,
    max_line_bytes: usize,
    cancel_token: CancellationToken,
) -> Result<(), ConnectionError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let result = tokio::select! {
            biased;

            _ = cancel_token.cancelled() => return Ok(()),
            result = read_line_bounded(&mut reader, max_line_bytes) => result,
        };

        match result {
            Ok(line) => {
                session.dispatch(&line).await;
                let _ = activity.try_send(());
            }
            Err(ConnectionError::Eof) => {
                debug!(session_id = %session.id(), "Client sent EOF");
                session.go_offline().await;
                return Ok(());
            }
            Err(e) => return Err(e),
        }
    }
}

/// Reads one line of at most `max` bytes, without its `\n` or `\r\n`.
///
/// A final line without a terminator is still returned. Invalid UTF-8 is
/// replaced rather than rejected.
pub async fn read_line_bounded<R>(reader: &mut R, max: usize) -> Result<String, ConnectionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    // Room for the longest allowed line plus "\r\n"
    let limit = max.saturating_add(2) as u64;

    let bytes_read = reader
        .take(limit)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

    if bytes_read == 0 {
        return Err(ConnectionError::Eof);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    if buf.len() > max {
        return Err(ConnectionError::MessageTooLarge {
            size: buf.len(),
            max,
        });
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Errors that can occur while reading from a client.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::spawn_bus;
    use crate::directory::spawn_directory;
    use chatroom_core::DisplayName;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_activity_is_signalled_after_dispatch() {
        let directory = spawn_directory();
        let bus = spawn_bus(directory.clone(), CancellationToken::new());
        let (mailbox, _mailbox_rx) = Mailbox::channel();
        let session = Arc::new(Session::new(
            SessionId::new(1),
            "127.0.0.1:40001".parse().unwrap(),
            mailbox,
            directory.clone(),
            bus,
        ));
        session.go_online().await.unwrap();

        let (mut client, server_half) = tokio::io::duplex(256);
        let (activity, mut activity_rx) = mpsc::channel(1);
        let cancel_token = CancellationToken::new();
        let reader = tokio::spawn(read_lines(
            Arc::clone(&session),
            BufReader::new(server_half),
            activity,
            64,
            cancel_token.clone(),
        ));

        client.write_all(b"rename|alice\n").await.unwrap();
        activity_rx.recv().await.unwrap();

        // The rename already took effect when the watchdog heard about it
        let alice = DisplayName::parse("alice").unwrap();
        assert!(directory.lookup(alice).await.is_some());

        cancel_token.cancel();
        reader.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_read_line_strips_terminators() {
        let mut input: &[u8] = b"hello\r\nworld\nlast";

        assert_eq!(read_line_bounded(&mut input, 64).await.unwrap(), "hello");
        assert_eq!(read_line_bounded(&mut input, 64).await.unwrap(), "world");
        assert_eq!(read_line_bounded(&mut input, 64).await.unwrap(), "last");
        assert!(matches!(
            read_line_bounded(&mut input, 64).await,
            Err(ConnectionError::Eof)
        ));
    }

    #[tokio::test]
    async fn test_read_line_keeps_blank_lines() {
        let mut input: &[u8] = b"\n\r\nx\n";

        assert_eq!(read_line_bounded(&mut input, 8).await.unwrap(), "");
        assert_eq!(read_line_bounded(&mut input, 8).await.unwrap(), "");
        assert_eq!(read_line_bounded(&mut input, 8).await.unwrap(), "x");
    }

    #[tokio::test]
    async fn test_read_line_accepts_exact_limit() {
        let mut input: &[u8] = b"12345\r\n";
        assert_eq!(read_line_bounded(&mut input, 5).await.unwrap(), "12345");
    }

    #[tokio::test]
    async fn test_read_line_rejects_oversized() {
        let mut input: &[u8] = b"123456\n";
        assert!(matches!(
            read_line_bounded(&mut input, 5).await,
            Err(ConnectionError::MessageTooLarge { size: 6, max: 5 })
        ));
    }

    #[tokio::test]
    async fn test_read_line_rejects_unterminated_flood() {
        let flood = vec![b'a'; 10_000];
        let mut input: &[u8] = &flood;

        let err = read_line_bounded(&mut input, 100).await.unwrap_err();
        // Only the bounded prefix is buffered
        assert!(matches!(
            err,
            ConnectionError::MessageTooLarge { size: 102, max: 100 }
        ));
    }

    #[tokio::test]
    async fn test_read_line_replaces_invalid_utf8() {
        let mut input: &[u8] = b"caf\xff\n";
        assert_eq!(
            read_line_bounded(&mut input, 64).await.unwrap(),
            "caf\u{fffd}"
        );
    }
}
