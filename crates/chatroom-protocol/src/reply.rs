//! Outbound text lines.
//!
//! Every line the server writes to a client is rendered here so the exact
//! wording lives in one place. Lines are rendered without the trailing
//! newline; the connection writer appends it.

use std::fmt;

/// A line of text sent to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply<'a> {
    /// A user joined: `<name> online now`
    Online { name: &'a str },

    /// A user left: `<name> offline now`
    Offline { name: &'a str },

    /// Public chat line: `[<address>] <name>: <content>`
    Public {
        address: &'a str,
        name: &'a str,
        content: &'a str,
    },

    /// One `who` listing entry: `[<address>] <name>: is online ...`
    WhoEntry { address: &'a str, name: &'a str },

    /// Private chat line as seen by the recipient: `<sender>: <content>`
    Private { sender: &'a str, content: &'a str },

    /// Rename succeeded.
    Renamed { name: &'a str },

    /// Rename target is held by someone (possibly the requester).
    NameInUse { name: &'a str },

    /// Private message to a name nobody holds.
    WrongUsername,

    /// Idle eviction notice, the last line a session receives.
    Evicted,

    /// Malformed `to|...` line.
    PrivateFormatHint,

    /// `to|<name>|` with no content.
    EmptyContent,

    /// Malformed `rename|...` line.
    RenameFormatHint,

    /// Rename could not be applied (session unlisted or server stopping).
    RenameFailed,

    /// Rename to a name that breaks the naming rules.
    InvalidName { reason: &'a str },
}

impl fmt::Display for Reply<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online { name } => write!(f, "{name} online now"),
            Self::Offline { name } => write!(f, "{name} offline now"),
            Self::Public {
                address,
                name,
                content,
            } => write!(f, "[{address}] {name}: {content}"),
            Self::WhoEntry { address, name } => write!(f, "[{address}] {name}: is online ..."),
            Self::Private { sender, content } => write!(f, "{sender}: {content}"),
            Self::Renamed { name } => write!(f, "You has updated your name to \"{name}\""),
            Self::NameInUse { name } => write!(f, "new name: {name} is been used ..."),
            Self::WrongUsername => f.write_str("wrong username"),
            Self::Evicted => f.write_str("You are out ..."),
            Self::PrivateFormatHint => {
                f.write_str("wrong msg format ... please use \"to|name|message content\"")
            }
            Self::EmptyContent => f.write_str("mull message content ... please retry"),
            Self::RenameFormatHint => f.write_str("wrong msg format ... please use \"rename|name\""),
            Self::RenameFailed => f.write_str("rename failed ... please retry"),
            Self::InvalidName { reason } => write!(f, "invalid name ... {reason}"),
        }
    }
}
