//! # shelf-core
//!
//! Core library of the shelf file-sharing service.
//!
//! This crate contains:
//! - **Codec / network**: `ShelfCodec` and `FramedChannel` for newline-delimited
//!   messages with per-message timeouts, plus the bounded `MessageHistory`
//! - **Protocol**: wire constants, `FileCnt` listings and GET payload encoding
//! - **Message**: `Command` parser and connection `Role`
//! - **Store**: the `FileStore` seam and its on-disk `LocalStore`
//! - **State**: `Coordinator` counters, shutdown signal and the drain procedure
//! - **Session / Server**: per-connection state machine and the listener pair
//! - **Client**: typed protocol client
//! - **Error**: `ShelfError`, a `thiserror`-based error hierarchy

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod network;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;
pub mod store;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use client::{Client, GotoOutcome, ShutdownReport};
pub use codec::ShelfCodec;
pub use error::{CommandError, ShelfError};
pub use message::{Command, Role};
pub use network::{ChannelSettings, FramedChannel, MessageHistory, MessageWriter};
pub use protocol::{Listing, ListingEntry};
pub use server::{Server, ServerSettings};
pub use session::{Session, SessionContext};
pub use state::{Coordinator, CoordinatorSnapshot, DrainOutcome, DrainSettings, SessionPhase};
pub use store::{DirEntry, FileStore, LocalStore};
