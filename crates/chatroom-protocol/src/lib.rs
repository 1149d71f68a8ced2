//! Chatroom Protocol - Wire protocol for chat clients
//!
//! One UTF-8 command per newline-terminated line:
//!
//! | Input line             | Meaning                         |
//! |------------------------|---------------------------------|
//! | `who`                  | list online users               |
//! | `rename|<name>`        | change own display name         |
//! | `to|<name>|<content>`  | private message                 |
//! | anything else          | public broadcast                |
//!
//! This crate only tokenizes input and renders output text; it performs no I/O.

pub mod command;
pub mod reply;

pub use command::{parse_line, Command, ParseError};
pub use reply::Reply;
