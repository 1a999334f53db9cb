//! Multi-user TCP chat relay library
//!
//! A chat relay where clients claim a unique identity with their first
//! frame, then exchange broadcast messages, `/msg` private messages, and
//! `/file` server-mediated file transfers. Application messages arrive
//! sealed to the server's public key; anything that fails to decrypt is
//! treated as plaintext control text by design.
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `RelayServer` is the central actor owning the connection registry
//! - Each connection has a `handler` task communicating with the actor
//! - No locks needed - all shared-state access goes through message passing,
//!   and deliveries only queue frames onto per-connection writer channels
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_relay::crypto::ServerKeypair;
//! use chat_relay::server::{self, DEFAULT_MAX_CONNECTIONS};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let keypair = Arc::new(ServerKeypair::generate());
//!     std::fs::write("server_public.key", keypair.public_key().to_hex())?;
//!     let listener = TcpListener::bind("127.0.0.1:5000").await?;
//!     server::serve(listener, keypair, DEFAULT_MAX_CONNECTIONS).await
//! }
//! ```

pub mod codec;
pub mod crypto;
pub mod error;
pub mod handler;
pub mod message;
pub mod peer;
pub mod registry;
pub mod relay;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use codec::{Command, DecryptOutcome};
pub use crypto::{EncryptedMessage, PublicKey, ServerKeypair};
pub use error::{AppError, CommandError, DuplicateIdentity, RelayError};
pub use handler::handle_connection;
pub use message::Frame;
pub use peer::Peer;
pub use registry::Registry;
pub use server::{RelayServer, ServerCommand};
pub use types::Username;
