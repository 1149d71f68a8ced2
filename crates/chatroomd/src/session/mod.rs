//! Server-side representative of one connected user.
//!
//! A `Session` ties together the connection's identity (id, remote address,
//! current display name), its outbound [`Mailbox`], and the shared
//! directory and broadcast bus. It is created `Online`-capable on accept and
//! moves to `Offline` exactly once; there is no way back.
//!
//! # Teardown
//!
//! Natural disconnect (reader sees EOF), transport errors, shutdown and idle
//! eviction can all race to take a session offline. [`Session::go_offline`]
//! is guarded twice: a one-shot latch on the session, and the directory's
//! remove-by-id, which hands the entry back to exactly one caller. Only that
//! caller announces the departure, and the mailbox is always closed last.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use chatroom_core::{DisplayName, SessionId};
use chatroom_protocol::{parse_line, Command, Reply};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bus::BroadcastBus;
use crate::directory::{DirectoryEntry, DirectoryError, DirectoryHandle};

mod mailbox;
mod writer;

pub use mailbox::{Mailbox, MailboxReceiver};
pub use writer::drain_mailbox;

/// One connected user.
pub struct Session {
    /// Connection identifier, stable across renames
    id: SessionId,

    /// Remote address, also the initial display name
    address: SocketAddr,

    /// Current display name; only the session's own reader renames it
    name: RwLock<DisplayName>,

    /// Outbound queue drained to the socket
    mailbox: Mailbox,

    /// Shared online-user directory
    directory: DirectoryHandle,

    /// Shared public channel
    bus: BroadcastBus,

    /// When the connection was accepted
    connected_at: DateTime<Utc>,

    /// Set by the first teardown
    offline: AtomicBool,
}

impl Session {
    /// Creates a session named after its remote address.
    pub fn new(
        id: SessionId,
        address: SocketAddr,
        mailbox: Mailbox,
        directory: DirectoryHandle,
        bus: BroadcastBus,
    ) -> Self {
        Self {
            id,
            address,
            name: RwLock::new(DisplayName::from_address(&address)),
            mailbox,
            directory,
            bus,
            connected_at: Utc::now(),
            offline: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Current display name.
    pub async fn name(&self) -> DisplayName {
        self.name.read().await.clone()
    }

    /// Returns `true` once any teardown path has run.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::Acquire)
    }

    /// Queues a line for this session only. Never blocks.
    ///
    /// Returns `false` if the mailbox is already closed.
    pub fn send_direct(&self, line: impl Into<String>) -> bool {
        self.mailbox.send(line)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Registers the session in the directory and announces it.
    ///
    /// # Errors
    ///
    /// Returns the directory error if registration failed. The session then
    /// stays connected but unlisted; this is logged, never fatal.
    pub async fn go_online(&self) -> Result<(), DirectoryError> {
        let name = self.name().await;

        let entry = DirectoryEntry {
            id: self.id,
            name: name.clone(),
            address: self.address,
            mailbox: self.mailbox.clone(),
            connected_at: self.connected_at,
        };

        if let Err(e) = self.directory.insert(entry).await {
            warn!(
                session_id = %self.id,
                name = %name,
                error = %e,
                "Could not register session"
            );
            return Err(e);
        }

        info!(session_id = %self.id, name = %name, "Session online");
        self.publish(Reply::Online {
            name: name.as_str(),
        });

        Ok(())
    }

    /// Removes the session from the directory, announces the departure and
    /// closes the mailbox.
    ///
    /// Safe to call from any number of teardown paths; returns `true` only
    /// for the call that actually took the session offline.
    pub async fn go_offline(&self) -> bool {
        self.teardown(None).await
    }

    /// Idle eviction: tears the session down and leaves `You are out ...`
    /// as the last line the user receives.
    ///
    /// Does nothing if the session is already offline, so the notice is
    /// sent at most once.
    pub async fn evict(&self) -> bool {
        self.teardown(Some(Reply::Evicted)).await
    }

    async fn teardown(&self, farewell: Option<Reply<'static>>) -> bool {
        if self.offline.swap(true, Ordering::AcqRel) {
            return false;
        }

        let removed = self.directory.remove_session(self.id).await;

        if let Some(entry) = &removed {
            let online_for = Utc::now().signed_duration_since(entry.connected_at);
            info!(
                session_id = %self.id,
                name = %entry.name,
                online_secs = online_for.num_seconds(),
                evicted = farewell.is_some(),
                "Session offline"
            );
            self.publish(Reply::Offline {
                name: entry.name.as_str(),
            });
        }

        // Last step: lets the drain task finish what is queued and exit.
        // A farewell also cuts off fan-out lines still in flight.
        match farewell {
            Some(reply) => {
                self.mailbox.close_with(reply.to_string());
            }
            None => self.mailbox.close(),
        }

        removed.is_some()
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Handles one inbound line (without its line terminator).
    ///
    /// Blank lines are ignored. Malformed commands are answered with a hint
    /// on this session's mailbox and never affect anybody else.
    pub async fn dispatch(&self, line: &str) {
        if line.is_empty() {
            return;
        }

        let command = match parse_line(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "Rejected malformed command");
                self.send_direct(e.reply());
                return;
            }
        };

        debug!(session_id = %self.id, command = command.kind(), "Dispatching command");

        match command {
            Command::Who => self.handle_who().await,
            Command::Rename { new_name } => self.handle_rename(new_name).await,
            Command::Private { recipient, content } => {
                self.handle_private(&recipient, &content).await
            }
            Command::Broadcast(content) => self.handle_broadcast(&content).await,
        }
    }

    async fn handle_who(&self) {
        for entry in self.directory.snapshot().await {
            let address = entry.address.to_string();
            self.send_direct(
                Reply::WhoEntry {
                    address: &address,
                    name: entry.name.as_str(),
                }
                .to_string(),
            );
        }
    }

    async fn handle_rename(&self, new_name: DisplayName) {
        match self.directory.rename(self.id, new_name.clone()).await {
            Ok(_previous) => {
                *self.name.write().await = new_name.clone();
                self.send_direct(
                    Reply::Renamed {
                        name: new_name.as_str(),
                    }
                    .to_string(),
                );
            }
            Err(DirectoryError::NameInUse(taken)) => {
                self.send_direct(
                    Reply::NameInUse {
                        name: taken.as_str(),
                    }
                    .to_string(),
                );
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Rename failed");
                self.send_direct(Reply::RenameFailed.to_string());
            }
        }
    }

    async fn handle_private(&self, recipient: &str, content: &str) {
        let target = match DisplayName::parse(recipient) {
            Ok(name) => self.directory.lookup(name).await,
            Err(_) => None,
        };

        let Some(target) = target else {
            self.send_direct(Reply::WrongUsername.to_string());
            return;
        };

        if content.is_empty() {
            self.send_direct(Reply::EmptyContent.to_string());
            return;
        }

        let sender = self.name().await;
        let delivered = target.mailbox.send(
            Reply::Private {
                sender: sender.as_str(),
                content,
            }
            .to_string(),
        );

        if !delivered {
            // Recipient is mid-teardown; same outcome as not being online
            self.send_direct(Reply::WrongUsername.to_string());
        }
    }

    async fn handle_broadcast(&self, content: &str) {
        let name = self.name().await;
        let address = self.address.to_string();
        self.publish(Reply::Public {
            address: &address,
            name: name.as_str(),
            content,
        });
    }

    fn publish(&self, reply: Reply<'_>) {
        if let Err(e) = self.bus.publish(reply.to_string()) {
            debug!(session_id = %self.id, error = %e, "Dropped public line");
        }
    }
}
