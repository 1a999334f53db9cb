//! Inbound frame classification and command parsing
//!
//! Every frame a registered client sends is either an encrypted
//! application message or plaintext control text. Classification is a
//! deliberate two-outcome decode, not an error path: try to open the frame
//! with the server's private key, and on any failure (not our wire format,
//! authentication mismatch, non-UTF-8 plaintext) treat the raw bytes as
//! control text.
//!
//! Control grammar, tried in order:
//! 1. `/file <username> <filename>` — filename keeps any trailing free text
//! 2. `/msg <username> <rest-of-line>`
//! 3. anything else — broadcast of the full text

use crate::crypto::{EncryptedMessage, ServerKeypair};
use crate::error::CommandError;

/// Outcome of attempting to decrypt an inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome {
    /// The frame was sealed to the server key and carried this text
    Decrypted(String),
    /// Not ciphertext for us; the raw bytes are control text
    NotCiphertext,
}

/// Attempt to open a frame with the server's private key
pub fn try_decrypt(keypair: &ServerKeypair, raw: &[u8]) -> DecryptOutcome {
    let Ok(encrypted) = EncryptedMessage::from_bytes(raw) else {
        return DecryptOutcome::NotCiphertext;
    };
    let Ok(plaintext) = keypair.decrypt(&encrypted) else {
        return DecryptOutcome::NotCiphertext;
    };
    match String::from_utf8(plaintext) {
        Ok(text) => DecryptOutcome::Decrypted(text),
        // Decrypted but not text: fall back like the other failures
        Err(_) => DecryptOutcome::NotCiphertext,
    }
}

/// Reduce a raw frame to its application text
///
/// Ciphertext yields the decrypted message; everything else is decoded
/// lossily as plaintext.
pub fn decode_frame(keypair: &ServerKeypair, raw: &[u8]) -> String {
    match try_decrypt(keypair, raw) {
        DecryptOutcome::Decrypted(text) => text,
        DecryptOutcome::NotCiphertext => String::from_utf8_lossy(raw).into_owned(),
    }
}

/// A parsed control message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Chat text for everyone else
    Broadcast { body: String },
    /// `/msg`: point-to-point text
    Private { to: String, body: String },
    /// `/file`: offer to stream a file to one user through the server
    FileOffer { to: String, filename: String },
}

/// Parse application text into a command
///
/// Arity failures are returned for the caller to surface as a usage
/// notice; they are not codec errors and never terminate the connection.
pub fn parse_command(text: &str) -> Result<Command, CommandError> {
    if text.starts_with("/file") {
        let mut parts = text.splitn(3, ' ');
        parts.next(); // the command itself
        let (Some(to), Some(filename)) = (parts.next(), parts.next()) else {
            return Err(CommandError::FileUsage);
        };
        Ok(Command::FileOffer {
            to: to.to_string(),
            filename: filename.to_string(),
        })
    } else if text.starts_with("/msg") {
        let mut parts = text.splitn(3, ' ');
        parts.next();
        let (Some(to), Some(body)) = (parts.next(), parts.next()) else {
            return Err(CommandError::MsgUsage);
        };
        Ok(Command::Private {
            to: to.to_string(),
            body: body.to_string(),
        })
    } else {
        Ok(Command::Broadcast {
            body: text.to_string(),
        })
    }
}
