//! Directory actor entries, commands and errors.
//!
//! This module defines the message types for communicating with the `DirectoryActor`:
//! - `DirectoryEntry`: What the directory stores per online session
//! - `DirectoryCommand`: Commands sent to the actor
//! - `DirectoryError`: Errors that can occur during directory operations

use std::net::SocketAddr;

use chatroom_core::{DisplayName, SessionId};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::Mailbox;

// ============================================================================
// Directory Entry
// ============================================================================

/// Everything other sessions need to reach one online session.
///
/// Entries are cloned out of the actor for lookups and snapshots; the
/// mailbox clone shares the same underlying queue.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Connection identifier, stable across renames
    pub id: SessionId,

    /// Name the session is currently registered under
    pub name: DisplayName,

    /// Remote address of the connection
    pub address: SocketAddr,

    /// Outbound queue of the session
    pub mailbox: Mailbox,

    /// When the connection was accepted
    pub connected_at: DateTime<Utc>,
}

// ============================================================================
// Directory Commands
// ============================================================================

/// Commands sent to the directory actor.
///
/// Each command carries a oneshot channel for the response. The actor
/// processes commands one at a time, so every command is atomic with
/// respect to every other.
#[derive(Debug)]
pub enum DirectoryCommand {
    /// Register a session under `entry.name`.
    ///
    /// # Errors
    /// - `DirectoryError::NameInUse` if the name is taken
    /// - `DirectoryError::AlreadyRegistered` if the session is already listed
    Insert {
        /// The entry to register (boxed for size optimization)
        entry: Box<DirectoryEntry>,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<(), DirectoryError>>,
    },

    /// Remove whatever session holds `name`. No-op if absent.
    Remove {
        name: DisplayName,
        respond_to: oneshot::Sender<Option<DirectoryEntry>>,
    },

    /// Remove a session by id, whatever name it currently holds.
    ///
    /// Returns the removed entry, or `None` if the session was not listed.
    RemoveSession {
        id: SessionId,
        respond_to: oneshot::Sender<Option<DirectoryEntry>>,
    },

    /// Find the session holding `name`.
    Lookup {
        name: DisplayName,
        respond_to: oneshot::Sender<Option<DirectoryEntry>>,
    },

    /// Move a session from its current name to `new_name`.
    ///
    /// Responds with the previous name on success.
    ///
    /// # Errors
    /// - `DirectoryError::NameInUse` if `new_name` is held by any session,
    ///   including the requester itself
    /// - `DirectoryError::SessionNotFound` if the session is not listed
    Rename {
        id: SessionId,
        new_name: DisplayName,
        respond_to: oneshot::Sender<Result<DisplayName, DirectoryError>>,
    },

    /// Every listed session, ordered by name.
    Snapshot {
        respond_to: oneshot::Sender<Vec<DirectoryEntry>>,
    },
}

// ============================================================================
// Directory Errors
// ============================================================================

/// Errors that can occur during directory operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// Another session (or the requester) already holds the name.
    #[error("name already in use: {0}")]
    NameInUse(DisplayName),

    /// The session is already registered under some name.
    #[error("session already registered: {0}")]
    AlreadyRegistered(SessionId),

    /// The session is not registered.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_error_display() {
        let err = DirectoryError::NameInUse(DisplayName::parse("alice").unwrap());
        assert_eq!(err.to_string(), "name already in use: alice");

        let err = DirectoryError::AlreadyRegistered(SessionId::new(3));
        assert_eq!(err.to_string(), "session already registered: conn-3");

        let err = DirectoryError::SessionNotFound(SessionId::new(4));
        assert_eq!(err.to_string(), "session not found: conn-4");

        let err = DirectoryError::ChannelClosed;
        assert_eq!(err.to_string(), "response channel closed");
    }
}
