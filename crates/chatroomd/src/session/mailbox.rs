//! Per-session outbound queue.
//!
//! A mailbox is an unbounded, ordered queue of rendered lines with exactly
//! one consumer, the session's drain task. Producers (the session itself,
//! other sessions sending private messages, the broadcast fan-out) never
//! block on it, so one slow client cannot stall anybody else.
//!
//! Closing is explicit and idempotent: after [`Mailbox::close`] no new line
//! is accepted, the consumer still receives everything queued before the
//! close, and then sees the end of the stream.
//!
//! [`Mailbox::close_with`] closes with a farewell line instead. The consumer
//! stops right after the farewell, so nothing a racing producer managed to
//! queue behind it is ever delivered.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One queued item.
#[derive(Debug)]
enum Outbound {
    Line(String),
    /// Last line the consumer will ever yield
    Farewell(String),
}

/// Producer side of a session's outbound queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Mailbox {
    sender: mpsc::UnboundedSender<Outbound>,
    closed: CancellationToken,
}

/// Consumer side of a session's outbound queue.
#[derive(Debug)]
pub struct MailboxReceiver {
    receiver: mpsc::UnboundedReceiver<Outbound>,
    closed: CancellationToken,
    finished: bool,
}

impl Mailbox {
    /// Creates a connected mailbox pair.
    pub fn channel() -> (Mailbox, MailboxReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        (
            Mailbox {
                sender,
                closed: closed.clone(),
            },
            MailboxReceiver {
                receiver,
                closed,
                finished: false,
            },
        )
    }

    /// Queues one line for delivery.
    ///
    /// Returns `false` if the mailbox is closed or its consumer is gone.
    pub fn send(&self, line: impl Into<String>) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        self.sender.send(Outbound::Line(line.into())).is_ok()
    }

    /// Stops accepting lines. Safe to call any number of times.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Queues `line` as the final line and closes the mailbox.
    ///
    /// Lines queued after the farewell are dropped by the consumer, even if
    /// their producer raced past the closed check. Returns `false` (and
    /// queues nothing) if the mailbox was already closed.
    pub fn close_with(&self, line: impl Into<String>) -> bool {
        if self.is_closed() {
            return false;
        }
        let queued = self.sender.send(Outbound::Farewell(line.into())).is_ok();
        self.closed.cancel();
        queued
    }

    /// Returns `true` once the mailbox has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.sender.is_closed()
    }
}

impl MailboxReceiver {
    /// Receives the next line in publish order.
    ///
    /// Returns `None` once the mailbox is closed and fully drained, after
    /// a farewell line, or when every producer has been dropped.
    pub async fn recv(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }

        let item = tokio::select! {
            biased;

            item = self.receiver.recv() => item,
            _ = self.closed.cancelled() => self.receiver.try_recv().ok(),
        };

        match item? {
            Outbound::Line(line) => Some(line),
            Outbound::Farewell(line) => {
                self.finished = true;
                self.receiver.close();
                Some(line)
            }
        }
    }

    /// Closes the mailbox from the consumer side.
    ///
    /// Used when the socket can no longer be written, so producers stop
    /// queueing lines nobody will read.
    pub fn close(&mut self) {
        self.closed.cancel();
        self.receiver.close();
    }
}
