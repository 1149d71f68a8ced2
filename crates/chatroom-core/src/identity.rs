//! Identifiers for connected users.

use std::fmt;
use std::net::SocketAddr;

use crate::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Maximum length of a display name in bytes.
pub const MAX_NAME_LEN: usize = 64;

/// Separator used by the wire protocol; never valid inside a name.
const FIELD_SEPARATOR: char = '|';

/// Stable identifier for one accepted connection.
///
/// Assigned from a monotonically increasing counter when the connection is
/// accepted and never reused for the lifetime of the process. Unlike the
/// display name, it does not change on rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The name a user is known by in the directory.
///
/// Every session starts out named after its remote address
/// (e.g. `127.0.0.1:50312`) and may rename itself later.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayName(String);

impl DisplayName {
    /// Parses a user-chosen name.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidName` if the name is empty, longer than
    /// [`MAX_NAME_LEN`] bytes, or contains `|` or a control character.
    pub fn parse(name: &str) -> DomainResult<Self> {
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name.len() > MAX_NAME_LEN {
            Some("name is too long")
        } else if name.contains(FIELD_SEPARATOR) {
            Some("name contains '|'")
        } else if name.chars().any(char::is_control) {
            Some("name contains a control character")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(DomainError::InvalidName {
                name: name.to_string(),
                reason,
            }),
            None => Ok(Self(name.to_string())),
        }
    }

    /// The default name of a freshly accepted connection.
    pub fn from_address(addr: &SocketAddr) -> Self {
        Self(addr.to_string())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
