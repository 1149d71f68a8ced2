//! Broadcast bus: one ordered queue of public lines, fanned out to every
//! online session.
//!
//! Any session may publish concurrently; a single fan-out task consumes the
//! queue in publish order. For each line it takes a directory snapshot,
//! then pushes a copy onto every listed mailbox. The snapshot is a plain
//! `Vec` by the time any mailbox is touched, so no directory exclusion is
//! held during delivery, and mailboxes are unbounded so delivery never
//! waits on a slow client.
//!
//! Because there is exactly one fan-out task and mailboxes are FIFO, every
//! session sees public lines in publish order.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::directory::DirectoryHandle;

/// Errors from publishing to the bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// The fan-out task has stopped (server shutting down).
    #[error("broadcast bus closed")]
    Closed,
}

/// Producer side of the broadcast bus. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: mpsc::UnboundedSender<String>,
}

impl BroadcastBus {
    /// Queues a fully rendered line for every online session.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Closed` if the fan-out task is gone.
    pub fn publish(&self, line: impl Into<String>) -> Result<(), BusError> {
        self.sender.send(line.into()).map_err(|_| BusError::Closed)
    }
}

/// Spawn the fan-out task and return the publishing side of the bus.
///
/// The task runs until `cancel_token` fires or every `BroadcastBus` clone
/// is dropped.
pub fn spawn_bus(directory: DirectoryHandle, cancel_token: CancellationToken) -> BroadcastBus {
    let (sender, receiver) = mpsc::unbounded_channel();
    tokio::spawn(run_fan_out(receiver, directory, cancel_token));
    BroadcastBus { sender }
}

async fn run_fan_out(
    mut receiver: mpsc::UnboundedReceiver<String>,
    directory: DirectoryHandle,
    cancel_token: CancellationToken,
) {
    debug!("Broadcast fan-out starting");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Broadcast fan-out shutting down");
                break;
            }

            line = receiver.recv() => match line {
                Some(line) => fan_out(&directory, &line).await,
                None => {
                    debug!("Broadcast bus channel closed");
                    break;
                }
            },
        }
    }

    info!("Broadcast fan-out stopped");
}

/// Delivers one line to every session listed at this moment.
async fn fan_out(directory: &DirectoryHandle, line: &str) {
    let recipients = directory.snapshot().await;

    let mut skipped = 0usize;
    for entry in &recipients {
        if !entry.mailbox.send(line) {
            skipped += 1;
        }
    }

    debug!(
        recipients = recipients.len(),
        skipped, "Broadcast delivered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{spawn_directory, DirectoryEntry};
    use crate::session::{Mailbox, MailboxReceiver};
    use chatroom_core::{DisplayName, SessionId};
    use chrono::Utc;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    async fn register(directory: &DirectoryHandle, id: u64, name: &str) -> MailboxReceiver {
        let (mailbox, receiver) = Mailbox::channel();
        directory
            .insert(DirectoryEntry {
                id: SessionId::new(id),
                name: DisplayName::parse(name).unwrap(),
                address: "127.0.0.1:7000".parse().unwrap(),
                mailbox,
                connected_at: Utc::now(),
            })
            .await
            .unwrap();
        receiver
    }

    async fn next(receiver: &mut MailboxReceiver) -> String {
        timeout(RECV_TIMEOUT, receiver.recv())
            .await
            .expect("timed out waiting for broadcast")
            .expect("mailbox ended")
    }

    #[tokio::test]
    async fn test_every_session_sees_every_line_in_order() {
        let directory = spawn_directory();
        let bus = spawn_bus(directory.clone(), CancellationToken::new());

        let mut receivers = Vec::new();
        for id in 0..3 {
            receivers.push(register(&directory, id, &format!("user{id}")).await);
        }

        for i in 0..10 {
            bus.publish(format!("msg {i}")).unwrap();
        }

        for receiver in &mut receivers {
            for i in 0..10 {
                assert_eq!(next(receiver).await, format!("msg {i}"));
            }
        }
    }

    #[tokio::test]
    async fn test_removed_session_misses_later_lines() {
        let directory = spawn_directory();
        let bus = spawn_bus(directory.clone(), CancellationToken::new());

        let mut stays = register(&directory, 1, "stays").await;
        let mut leaves = register(&directory, 2, "leaves").await;

        bus.publish("before").unwrap();
        assert_eq!(next(&mut stays).await, "before");
        assert_eq!(next(&mut leaves).await, "before");

        directory.remove_session(SessionId::new(2)).await.unwrap();
        bus.publish("after").unwrap();
        assert_eq!(next(&mut stays).await, "after");

        // Nothing arrives for the removed session
        assert!(timeout(Duration::from_millis(100), leaves.recv())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_closed_mailbox_does_not_block_others() {
        let directory = spawn_directory();
        let bus = spawn_bus(directory.clone(), CancellationToken::new());

        let (dead, _dead_receiver) = Mailbox::channel();
        dead.close();
        directory
            .insert(DirectoryEntry {
                id: SessionId::new(1),
                name: DisplayName::parse("dead").unwrap(),
                address: "127.0.0.1:7001".parse().unwrap(),
                mailbox: dead,
                connected_at: Utc::now(),
            })
            .await
            .unwrap();
        let mut alive = register(&directory, 2, "alive").await;

        bus.publish("still flowing").unwrap();
        assert_eq!(next(&mut alive).await, "still flowing");
    }

    #[tokio::test]
    async fn test_publish_fails_after_shutdown() {
        let directory = spawn_directory();
        let cancel_token = CancellationToken::new();
        let bus = spawn_bus(directory, cancel_token.clone());

        cancel_token.cancel();

        // The fan-out task drops its receiver once it observes cancellation
        let mut closed = false;
        for _ in 0..50 {
            if bus.publish("late").is_err() {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(closed);
        assert_eq!(bus.publish("late"), Err(BusError::Closed));
    }
}
