//! Error types for the chat relay
//!
//! Defines connection-level errors, command parse errors, file-relay
//! protocol errors, and crypto errors. Uses thiserror for ergonomic
//! error definitions.
//!
//! The `Display` strings of `CommandError` and `RelayError` are the exact
//! text sent back to clients as `[Server]:` notices, so the wire wording
//! lives next to the error definition.

use thiserror::Error;

use crate::types::Username;

/// Connection-level errors
///
/// All of these are terminal for the connection they occur on and never
/// affect any other connection.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the client socket (fatal for this connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The relay actor is gone (fatal - internal channel broken)
    #[error("Server channel closed")]
    ChannelSend,
}

/// Registration conflict: the claimed username is already live.
#[derive(Debug, Error)]
#[error("Username '{0}' is already taken")]
pub struct DuplicateIdentity(pub Username);

/// Command arity errors
///
/// A malformed `/file` or `/msg` never terminates the connection; the
/// Display text goes back to the offending client as a usage notice.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// `/file` with fewer than two arguments
    #[error("Usage: /file <username> <filename>")]
    FileUsage,

    /// `/msg` with fewer than two arguments
    #[error("Invalid private message format.")]
    MsgUsage,
}

/// File sub-protocol framing errors
///
/// Each aborts the transfer session in progress; the connection continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Peer closed before sending the full 10-byte size header
    #[error("Failed to receive file size.")]
    MissingSizeHeader,

    /// Size header was not a left-padded ASCII decimal
    #[error("Invalid file size received.")]
    InvalidSizeHeader,

    /// Peer closed before the declared byte count arrived
    #[error("File transfer incomplete. Expected {expected}, got {received} bytes.")]
    Incomplete { expected: u64, received: u64 },
}

/// Cryptographic errors
///
/// Only surfaced when a caller explicitly encrypts or decodes key material;
/// a frame that fails decryption inside the codec is handled as the
/// plaintext fallback, not as an error.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encrypted frame too short or structurally invalid
    #[error("Invalid encrypted data: {context}")]
    InvalidEncryptedData { context: String },

    /// AEAD decryption failed (wrong key or tampered ciphertext)
    #[error("Decryption failed")]
    DecryptionFailed,

    /// AEAD encryption failed
    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Key bytes of the wrong length
    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}
