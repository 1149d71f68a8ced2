//! Directory actor - owns the name → session mapping and processes commands.
//!
//! The DirectoryActor is the single owner of the online-user mapping.
//! Commands arrive over an mpsc channel and are applied one at a time, which
//! makes every operation (including the remove-old/insert-new pair of a
//! rename) linearizable without exposing a lock to callers.
//!
//! The actor never performs socket I/O. Lookups and snapshots hand out
//! cloned entries and callers write to mailboxes after the actor has moved
//! on to the next command.

use std::collections::{BTreeMap, HashMap};

use chatroom_core::{DisplayName, SessionId};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::commands::{DirectoryCommand, DirectoryEntry, DirectoryError};

// ============================================================================
// Directory Actor
// ============================================================================

/// The directory actor - owns all online-user state.
///
/// # Ownership
///
/// The actor owns:
/// - `entries`: name → entry, ordered so listings come out sorted
/// - `names_by_session`: index for session id → current name
///
/// Both maps are updated together inside a single command, so at any point
/// between commands every listed session appears under exactly one name.
pub struct DirectoryActor {
    /// Command receiver
    receiver: mpsc::Receiver<DirectoryCommand>,

    /// Primary storage keyed by display name.
    entries: BTreeMap<DisplayName, DirectoryEntry>,

    /// Reverse index used by teardown and rename.
    names_by_session: HashMap<SessionId, DisplayName>,
}

impl DirectoryActor {
    /// Creates a new directory actor.
    pub fn new(receiver: mpsc::Receiver<DirectoryCommand>) -> Self {
        Self {
            receiver,
            entries: BTreeMap::new(),
            names_by_session: HashMap::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    pub async fn run(mut self) {
        info!("Directory actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.entries.len(), "Directory actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: DirectoryCommand) {
        // Send errors are ignored throughout: the caller may have given up
        match cmd {
            DirectoryCommand::Insert { entry, respond_to } => {
                let _ = respond_to.send(self.handle_insert(*entry));
            }
            DirectoryCommand::Remove { name, respond_to } => {
                let _ = respond_to.send(self.handle_remove(&name));
            }
            DirectoryCommand::RemoveSession { id, respond_to } => {
                let _ = respond_to.send(self.handle_remove_session(id));
            }
            DirectoryCommand::Lookup { name, respond_to } => {
                let _ = respond_to.send(self.entries.get(&name).cloned());
            }
            DirectoryCommand::Rename {
                id,
                new_name,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_rename(id, new_name));
            }
            DirectoryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.entries.values().cloned().collect());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_insert(&mut self, entry: DirectoryEntry) -> Result<(), DirectoryError> {
        if self.entries.contains_key(&entry.name) {
            debug!(
                session_id = %entry.id,
                name = %entry.name,
                "Name already in use, rejecting registration"
            );
            return Err(DirectoryError::NameInUse(entry.name));
        }

        if self.names_by_session.contains_key(&entry.id) {
            return Err(DirectoryError::AlreadyRegistered(entry.id));
        }

        self.names_by_session.insert(entry.id, entry.name.clone());
        info!(
            session_id = %entry.id,
            name = %entry.name,
            addr = %entry.address,
            total_sessions = self.entries.len() + 1,
            "Session registered"
        );
        self.entries.insert(entry.name.clone(), entry);

        Ok(())
    }

    fn handle_remove(&mut self, name: &DisplayName) -> Option<DirectoryEntry> {
        let entry = self.entries.remove(name)?;
        self.names_by_session.remove(&entry.id);
        debug!(session_id = %entry.id, name = %name, "Session removed by name");
        Some(entry)
    }

    fn handle_remove_session(&mut self, id: SessionId) -> Option<DirectoryEntry> {
        let name = self.names_by_session.remove(&id)?;
        let entry = self.entries.remove(&name);
        debug!(
            session_id = %id,
            name = %name,
            remaining = self.entries.len(),
            "Session removed"
        );
        entry
    }

    fn handle_rename(
        &mut self,
        id: SessionId,
        new_name: DisplayName,
    ) -> Result<DisplayName, DirectoryError> {
        if self.entries.contains_key(&new_name) {
            return Err(DirectoryError::NameInUse(new_name));
        }

        let old_name = self
            .names_by_session
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::SessionNotFound(id))?;

        let mut entry = self
            .entries
            .remove(&old_name)
            .ok_or(DirectoryError::SessionNotFound(id))?;

        entry.name = new_name.clone();
        self.entries.insert(new_name.clone(), entry);
        self.names_by_session.insert(id, new_name.clone());

        info!(
            session_id = %id,
            old_name = %old_name,
            new_name = %new_name,
            "Session renamed"
        );

        Ok(old_name)
    }

    // ========================================================================
    // Test Helpers
    // ========================================================================

    /// Returns the number of listed sessions (for testing).
    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.entries.len()
    }

    /// Checks that both maps describe the same set of sessions (for testing).
    #[cfg(test)]
    fn assert_consistent(&self) {
        assert_eq!(self.entries.len(), self.names_by_session.len());
        for (name, entry) in &self.entries {
            assert_eq!(&entry.name, name);
            assert_eq!(self.names_by_session.get(&entry.id), Some(name));
        }
    }
}
