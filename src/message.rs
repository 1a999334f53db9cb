//! Wire message definitions
//!
//! The relay speaks a plain-text protocol: every server-to-client line is
//! UTF-8 prefixed by a tag (`[Server]:`, `[Private]`, `[File]:`, or
//! `[<username>]:` for chat). File payloads travel as raw binary frames.
//!
//! `Frame` is the unit queued to a connection's writer task; the
//! constructors here keep the tag wording in one place.

use crate::types::Username;

/// One outbound frame for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A tagged UTF-8 notice or chat line
    Text(String),
    /// Raw bytes (file header or file payload), written verbatim
    Binary(Vec<u8>),
}

impl Frame {
    /// The bytes this frame puts on the wire
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }
}

/// `[Server]: <body>` notice
pub fn server_notice(body: impl std::fmt::Display) -> Frame {
    Frame::Text(format!("[Server]: {}", body))
}

/// `[Private] <from>: <body>` point-to-point line
pub fn private_line(from: &Username, body: &str) -> Frame {
    Frame::Text(format!("[Private] {}: {}", from, body))
}

/// `[File]:` offer notice sent to a transfer's receiver
pub fn file_offer(from: &Username, filename: &str) -> Frame {
    Frame::Text(format!("[File]: {} sent you a file: {}", from, filename))
}

/// `[Server]:` notice for a private message or file offer to nobody
pub fn target_not_found(target: &str) -> Frame {
    server_notice(format!("User '{}' not found.", target))
}
