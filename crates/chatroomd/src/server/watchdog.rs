//! Per-connection idle watchdog.
//!
//! The reader signals activity on a capacity-1 channel after every line it
//! reads; the watchdog re-arms its timer on each signal. Dropping the
//! sender (reader finished) ends the watch.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

/// How an idle watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The reader stopped on its own (EOF, error, shutdown).
    ReaderFinished,

    /// No activity for the whole idle period.
    TimedOut,
}

/// Creates the activity signal pair.
///
/// The reader should use `try_send`: a full channel already means the
/// watchdog has a pending re-arm, so nothing is lost.
pub fn activity_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(1)
}

/// Waits until the reader goes quiet for `idle` or finishes.
pub async fn watch_idle(activity: &mut mpsc::Receiver<()>, idle: Duration) -> IdleOutcome {
    loop {
        match timeout(idle, activity.recv()).await {
            Ok(Some(())) => continue,
            Ok(None) => return IdleOutcome::ReaderFinished,
            Err(_) => return IdleOutcome::TimedOut,
        }
    }
}
