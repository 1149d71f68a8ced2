//! Online-user directory using the Actor pattern.
//!
//! The directory maps display names to online sessions. It receives
//! commands via a tokio mpsc channel and is the only place the mapping
//! lives, so renames and online/offline transitions are linearizable.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  DirectoryCommand  ┌──────────────────┐
//! │ Session (reader, │───────────────────▶│  DirectoryActor  │
//! │ watchdog, bus)   │   (mpsc channel)   │                  │
//! └──────────────────┘                    └────────┬─────────┘
//!          ▲                                       │
//!          │       oneshot responses               ▼
//!          └─────────────────────────────  BTreeMap<DisplayName,
//!                                                DirectoryEntry>
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::DirectoryActor;
pub use commands::{DirectoryCommand, DirectoryEntry, DirectoryError};
pub use handle::DirectoryHandle;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Spawn the directory actor and return a handle for interaction.
///
/// The actor runs until every clone of the returned handle is dropped.
///
/// # Example
///
/// ```no_run
/// use chatroomd::directory::spawn_directory;
///
/// #[tokio::main]
/// async fn main() {
///     let directory = spawn_directory();
///     let online = directory.snapshot().await;
///     assert!(online.is_empty());
/// }
/// ```
pub fn spawn_directory() -> DirectoryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = DirectoryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    DirectoryHandle::new(cmd_tx)
}
