//! Protocol messages and their wire encoding.
//!
//! Every message travels as one WebSocket binary frame containing a UTF-8
//! JSON object; the `type` field selects the variant. The frame layer
//! reassembles fragmented transport reads, so decoding always sees one
//! whole message. File content is base64-encoded so raw bytes survive the
//! text encoding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum frame size (50MB) to prevent memory exhaustion from malicious peers.
pub const MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

/// Per-username publish lists, as carried by `files_update`.
pub type Catalogs = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    Oversize { len: usize, max: usize },
}

/// A protocol message.
///
/// Field names are part of the wire contract; renaming one breaks
/// interoperability with deployed peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Initial registration: claim a username and publish a catalog.
    Auth { username: String, catalog: Vec<String> },
    /// Full snapshot of other peers' catalogs (never includes the recipient).
    FilesUpdate { catalogs: Catalogs },
    /// A peer joined with the given catalog.
    NewClient { username: String, catalog: Vec<String> },
    /// A peer left.
    ClientDisconnected { username: String },
    /// Publish one file.
    AddFile { filename: String },
    /// Unpublish one file.
    DeleteFile { filename: String },
    /// Fan-out of a peer's `add_file`.
    NewFile { username: String, filename: String },
    /// Fan-out of a peer's `delete_file`.
    DeleteFileNotice { username: String, filename: String },
    /// Ask the server to forward a file request to `owner`.
    RequestFile { owner: String, filename: String },
    /// Forwarded request, delivered to the file's owner.
    FileRequest { from: String, filename: String },
    /// File content in transit. `to` addresses the requester on the
    /// peer→server leg and is stripped when the server forwards it on.
    FileDelivery {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        filename: String,
        #[serde(with = "content_encoding")]
        content: Vec<u8>,
    },
    /// Graceful leave.
    Disconnect,
    /// Ack of a graceful leave; the final message on that stream.
    Disconnected,
    /// Recoverable protocol-level error report.
    Error { message: String },
}

impl Message {
    /// Encode to the UTF-8 JSON bytes of one frame.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("message serialization should not fail")
    }

    /// Decode one whole frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::Oversize {
                len: data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(serde_json::from_slice(data)?)
    }

    /// The wire tag, for logging.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Auth { .. } => "auth",
            Message::FilesUpdate { .. } => "files_update",
            Message::NewClient { .. } => "new_client",
            Message::ClientDisconnected { .. } => "client_disconnected",
            Message::AddFile { .. } => "add_file",
            Message::DeleteFile { .. } => "delete_file",
            Message::NewFile { .. } => "new_file",
            Message::DeleteFileNotice { .. } => "delete_file_notice",
            Message::RequestFile { .. } => "request_file",
            Message::FileRequest { .. } => "file_request",
            Message::FileDelivery { .. } => "file_delivery",
            Message::Disconnect => "disconnect",
            Message::Disconnected => "disconnected",
            Message::Error { .. } => "error",
        }
    }
}

/// Base64 transport encoding for file bytes inside the JSON frame.
mod content_encoding {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
