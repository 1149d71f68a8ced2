//! Chatroom Daemon - Directory, broadcast bus and connection handling
//!
//! This crate provides the server-side engine of the chat service:
//! - `directory` - Single-owner actor mapping display names to sessions
//! - `bus` - Ordered broadcast bus with a fan-out task
//! - `session` - Per-connection identity, mailbox and command dispatch
//! - `server` - TCP accept loop, connection handler and idle watchdog
//! - `config` - Layered server configuration
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        chatroomd                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────────┐          ┌──────────────────────────┐   │
//! │  │   ChatServer    │─────────▶│     DirectoryActor       │   │
//! │  │ (TcpListener)   │          │  (name → session owner)  │   │
//! │  └────────┬────────┘          └────────────▲─────────────┘   │
//! │           │ accept()                       │ snapshot        │
//! │           ▼                                │                 │
//! │  ┌─────────────────┐  publish  ┌───────────┴──────────────┐  │
//! │  │ConnectionHandler│──────────▶│   BroadcastBus fan-out   │  │
//! │  │ reader/watchdog │           └───────────┬──────────────┘  │
//! │  └────────┬────────┘                       │ per-session     │
//! │           │ direct replies                 ▼                 │
//! │           └────────────────────────▶  Mailbox → socket       │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod bus;
pub mod config;
pub mod directory;
pub mod server;
pub mod session;
