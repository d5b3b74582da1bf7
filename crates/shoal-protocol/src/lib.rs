//! shoal-protocol: the wire protocol shared by the rendezvous server and peers.
//!
//! Defines the typed message set, its JSON encoding, and the framing
//! contract (one WebSocket binary frame per message).

pub mod message;

pub use message::{Catalogs, Message, ProtocolError, MAX_MESSAGE_SIZE};
