//! Client interface for interacting with the DirectoryActor.
//!
//! The `DirectoryHandle` provides a cheap-to-clone interface for sending
//! commands to the directory actor. It is the only way to reach the
//! name → session mapping; the map itself never leaves the actor.

use chatroom_core::{DisplayName, SessionId};
use tokio::sync::{mpsc, oneshot};

use super::commands::{DirectoryCommand, DirectoryEntry, DirectoryError};

// ============================================================================
// Directory Handle
// ============================================================================

/// Handle for interacting with the directory actor.
///
/// # Usage
///
/// ```ignore
/// let directory = spawn_directory();
///
/// directory.insert(entry).await?;
/// let previous = directory.rename(id, new_name).await?;
/// for entry in directory.snapshot().await {
///     entry.mailbox.send(line.clone());
/// }
/// ```
#[derive(Clone)]
pub struct DirectoryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<DirectoryCommand>,
}

impl DirectoryHandle {
    /// Create a new directory handle.
    pub fn new(sender: mpsc::Sender<DirectoryCommand>) -> Self {
        Self { sender }
    }

    /// Register a session under `entry.name`.
    ///
    /// # Errors
    ///
    /// - `DirectoryError::NameInUse` if the name is taken
    /// - `DirectoryError::AlreadyRegistered` if the session is already listed
    /// - `DirectoryError::ChannelClosed` if the actor has shut down
    pub async fn insert(&self, entry: DirectoryEntry) -> Result<(), DirectoryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DirectoryCommand::Insert {
                entry: Box::new(entry),
                respond_to: tx,
            })
            .await
            .map_err(|_| DirectoryError::ChannelClosed)?;

        rx.await.map_err(|_| DirectoryError::ChannelClosed)?
    }

    /// Remove the session holding `name`, if any.
    ///
    /// Returns `None` if nobody holds the name or the actor is gone.
    pub async fn remove(&self, name: DisplayName) -> Option<DirectoryEntry> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DirectoryCommand::Remove {
                name,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Remove a session by id, whatever name it currently holds.
    ///
    /// Returns the removed entry. Exactly one caller ever gets `Some` for a
    /// given session, which makes this the authority on whether a teardown
    /// actually took the session offline.
    pub async fn remove_session(&self, id: SessionId) -> Option<DirectoryEntry> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DirectoryCommand::RemoveSession { id, respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Find the session holding `name`.
    pub async fn lookup(&self, name: DisplayName) -> Option<DirectoryEntry> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DirectoryCommand::Lookup {
                name,
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Atomically move a session to `new_name`, returning its previous name.
    ///
    /// # Errors
    ///
    /// - `DirectoryError::NameInUse` if `new_name` is held by anyone
    /// - `DirectoryError::SessionNotFound` if the session is not listed
    /// - `DirectoryError::ChannelClosed` if the actor has shut down
    pub async fn rename(
        &self,
        id: SessionId,
        new_name: DisplayName,
    ) -> Result<DisplayName, DirectoryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(DirectoryCommand::Rename {
                id,
                new_name,
                respond_to: tx,
            })
            .await
            .map_err(|_| DirectoryError::ChannelClosed)?;

        rx.await.map_err(|_| DirectoryError::ChannelClosed)?
    }

    /// Every listed session, ordered by name.
    ///
    /// Returns an empty vector if the actor is gone.
    pub async fn snapshot(&self) -> Vec<DirectoryEntry> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(DirectoryCommand::Snapshot { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Mailbox;
    use chrono::Utc;

    fn create_test_handle() -> (DirectoryHandle, mpsc::Receiver<DirectoryCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (DirectoryHandle::new(cmd_tx), cmd_rx)
    }

    fn create_entry(id: u64, name: &str) -> DirectoryEntry {
        let (mailbox, _receiver) = Mailbox::channel();
        DirectoryEntry {
            id: SessionId::new(id),
            name: DisplayName::parse(name).unwrap(),
            address: "127.0.0.1:9000".parse().unwrap(),
            mailbox,
            connected_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(DirectoryCommand::Insert { entry, respond_to }) = rx.recv().await {
                assert_eq!(entry.name.as_str(), "alice");
                let _ = respond_to.send(Ok(()));
                return true;
            }
            false
        });

        let result = handle.insert(create_entry(1, "alice")).await;
        assert!(result.is_ok());
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_insert_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle.insert(create_entry(1, "alice")).await;
        assert!(matches!(result, Err(DirectoryError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_rename_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(DirectoryCommand::Rename {
                id,
                new_name,
                respond_to,
            }) = rx.recv().await
            {
                assert_eq!(id, SessionId::new(5));
                assert_eq!(new_name.as_str(), "bob");
                let _ = respond_to.send(Ok(DisplayName::parse("old").unwrap()));
                return true;
            }
            false
        });

        let result = handle
            .rename(SessionId::new(5), DisplayName::parse("bob").unwrap())
            .await;
        assert_eq!(result.unwrap().as_str(), "old");
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_queries_degrade_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.snapshot().await.is_empty());
        assert!(handle
            .lookup(DisplayName::parse("alice").unwrap())
            .await
            .is_none());
        assert!(handle.remove_session(SessionId::new(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_rename_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let result = handle
            .rename(SessionId::new(1), DisplayName::parse("x").unwrap())
            .await;
        assert!(matches!(result, Err(DirectoryError::ChannelClosed)));
    }
}
