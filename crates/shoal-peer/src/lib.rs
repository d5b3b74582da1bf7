//! shoal-peer library: exposes the peer components for testing.
//!
//! The peer is thin I/O plumbing around the protocol: a server connection,
//! a share-directory watcher, a local library, and a command prompt. It
//! holds no registry and no cross-peer state.

pub mod commands;
pub mod connection;
pub mod library;
pub mod watcher;

// Re-export key types for convenience
pub use commands::Command;
pub use connection::ServerConnection;
pub use library::Library;
pub use watcher::{ShareEvent, ShareEventKind, ShareWatcher};
