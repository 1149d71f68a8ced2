//! Mailbox drain task: the only writer of a session's socket.

use std::time::Duration;

use chatroom_core::SessionId;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::mailbox::MailboxReceiver;

/// Writes every queued line to `writer`, newline-terminated, in order.
///
/// Runs until the mailbox is closed and drained, or a write fails or times
/// out. In the failure case the mailbox is closed from this side so
/// producers stop queueing. The write half is shut down on exit either way.
pub async fn drain_mailbox<W>(
    id: SessionId,
    mut mailbox: MailboxReceiver,
    writer: W,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    let mut delivered: u64 = 0;

    while let Some(line) = mailbox.recv().await {
        let result = timeout(write_timeout, async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await;

        match result {
            Ok(Ok(())) => delivered += 1,
            Ok(Err(e)) => {
                debug!(session_id = %id, error = %e, "Socket write failed");
                mailbox.close();
                break;
            }
            Err(_) => {
                warn!(
                    session_id = %id,
                    timeout_ms = write_timeout.as_millis() as u64,
                    "Socket write timed out"
                );
                mailbox.close();
                break;
            }
        }
    }

    // Shutdown flushes first, which can stall on the same peer
    let _ = timeout(write_timeout, writer.shutdown()).await;
    debug!(session_id = %id, delivered, "Mailbox drain finished");
}
