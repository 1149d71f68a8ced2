//! Chatroom Core - Shared types for the chat server
//!
//! This crate provides the domain value types shared between
//! the wire protocol (`chatroom-protocol`) and the daemon (`chatroomd`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod identity;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use identity::{DisplayName, SessionId, MAX_NAME_LEN};
