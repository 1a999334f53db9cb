//! Chat relay server - entry point
//!
//! Generates the server keypair, publishes the public half, and accepts
//! connections until terminated.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::crypto::ServerKeypair;
use chat_relay::server::{self, DEFAULT_MAX_CONNECTIONS};

/// Default bind address
const DEFAULT_ADDR: &str = "127.0.0.1:5000";

/// Well-known path clients read the public key from, out of band
const PUBLIC_KEY_PATH: &str = "server_public.key";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Get bind address from command line or use default
    let addr = env::args().nth(1).unwrap_or_else(|| DEFAULT_ADDR.to_string());

    // One keypair for the process lifetime; clients fetch the public half
    // from the key file before connecting
    let keypair = Arc::new(ServerKeypair::generate());
    tokio::fs::write(PUBLIC_KEY_PATH, keypair.public_key().to_hex()).await?;
    info!("Public key written to {}", PUBLIC_KEY_PATH);

    let listener = TcpListener::bind(&addr).await?;
    info!("Chat relay listening on {}", addr);

    server::serve(listener, keypair, DEFAULT_MAX_CONNECTIONS).await?;

    Ok(())
}
