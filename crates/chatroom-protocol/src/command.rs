//! Tokenizing inbound lines into commands.
//!
//! Each command form is matched on its keyword prefix and then validated for
//! exact arity before anything is dispatched, so a malformed line surfaces as
//! a [`ParseError`] instead of a partially-indexed field list.

use chatroom_core::{DisplayName, DomainError};
use thiserror::Error;

use crate::reply::Reply;

/// Keyword for the online-user listing.
const WHO: &str = "who";

/// Prefix of a rename request: `rename|<name>`.
const RENAME_PREFIX: &str = "rename|";

/// Prefix of a private message: `to|<name>|<content>`.
const PRIVATE_PREFIX: &str = "to|";

const SEPARATOR: char = '|';

// ============================================================================
// Commands
// ============================================================================

/// A single parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List every online user.
    Who,

    /// Change the sender's display name.
    Rename {
        /// The requested name (already validated)
        new_name: DisplayName,
    },

    /// Deliver `content` to one named user only.
    Private {
        /// Name of the recipient as typed by the sender
        recipient: String,
        /// Message body; may itself contain `|`. Emptiness is only
        /// reported once the recipient is known to be online.
        content: String,
    },

    /// Publish the line to every online user.
    Broadcast(String),
}

impl Command {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Who => "who",
            Self::Rename { .. } => "rename",
            Self::Private { .. } => "private",
            Self::Broadcast(_) => "broadcast",
        }
    }
}

// ============================================================================
// Parse Errors
// ============================================================================

/// A line that uses a command keyword but does not fit its grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// `to|` without a recipient or without the content separator.
    #[error("malformed private message")]
    MalformedPrivateMessage,

    /// `rename|` without a name, or with more than one field.
    #[error("malformed rename request")]
    MalformedRename,

    /// `rename|<name>` where the name breaks the naming rules.
    #[error(transparent)]
    InvalidName(#[from] DomainError),
}

impl ParseError {
    /// The text sent back to the client that sent the malformed line.
    pub fn reply(&self) -> String {
        match self {
            Self::MalformedPrivateMessage => Reply::PrivateFormatHint.to_string(),
            Self::MalformedRename => Reply::RenameFormatHint.to_string(),
            Self::InvalidName(DomainError::InvalidName { reason, .. }) => {
                Reply::InvalidName { reason: *reason }.to_string()
            }
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses one line (without its trailing newline) into a [`Command`].
///
/// Lines that do not start with a command keyword are broadcasts, so the
/// only failures are keyword lines with the wrong shape.
///
/// # Errors
///
/// See [`ParseError`] for the rejected forms.
pub fn parse_line(line: &str) -> Result<Command, ParseError> {
    if line == WHO {
        return Ok(Command::Who);
    }

    if let Some(rest) = line.strip_prefix(RENAME_PREFIX) {
        return parse_rename(rest);
    }

    if let Some(rest) = line.strip_prefix(PRIVATE_PREFIX) {
        return parse_private(rest);
    }

    Ok(Command::Broadcast(line.to_string()))
}

fn parse_rename(rest: &str) -> Result<Command, ParseError> {
    if rest.is_empty() || rest.contains(SEPARATOR) {
        return Err(ParseError::MalformedRename);
    }

    let new_name = DisplayName::parse(rest)?;
    Ok(Command::Rename { new_name })
}

fn parse_private(rest: &str) -> Result<Command, ParseError> {
    let (recipient, content) = rest
        .split_once(SEPARATOR)
        .ok_or(ParseError::MalformedPrivateMessage)?;

    if recipient.is_empty() {
        return Err(ParseError::MalformedPrivateMessage);
    }

    Ok(Command::Private {
        recipient: recipient.to_string(),
        content: content.to_string(),
    })
}
