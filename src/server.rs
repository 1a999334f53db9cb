//! RelayServer actor implementation
//!
//! The central actor that owns the connection registry. Connection
//! handlers never touch shared state directly; they send commands over an
//! mpsc channel, so register/unregister are naturally atomic and no lock
//! is ever held across network I/O: delivery only queues frames onto each
//! recipient's writer channel.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, info, warn};

use crate::crypto::ServerKeypair;
use crate::error::DuplicateIdentity;
use crate::handler;
use crate::message::{self, Frame};
use crate::peer::Peer;
use crate::registry::Registry;
use crate::types::Username;

/// Channel buffer size for server commands
pub const COMMAND_BUFFER_SIZE: usize = 256;

/// Default cap on concurrently served connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Commands sent from connection handlers to the RelayServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Claim an identity; on success the actor delivers the roster notice
    /// and announces the arrival before replying
    Register {
        username: Username,
        sender: mpsc::Sender<Frame>,
        reply: oneshot::Sender<Result<(), DuplicateIdentity>>,
    },
    /// Release an identity and announce the departure
    Unregister { username: Username },
    /// Fan a pre-tagged chat line out to everyone but the sender
    Broadcast { from: Username, line: String },
    /// Deliver a private message, or a not-found notice back to the sender
    Private {
        from: Username,
        to: Username,
        body: String,
    },
    /// Look up a peer's writer channel for a file transfer
    ResolvePeer {
        username: Username,
        reply: oneshot::Sender<Option<mpsc::Sender<Frame>>>,
    },
}

/// The relay actor: single owner of the registry
pub struct RelayServer {
    registry: Registry,
    receiver: mpsc::Receiver<ServerCommand>,
}

impl RelayServer {
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: Registry::new(),
            receiver,
        }
    }

    /// Run the actor event loop until all command senders are dropped
    pub async fn run(mut self) {
        info!("RelayServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!("RelayServer shutting down");
    }

    async fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register {
                username,
                sender,
                reply,
            } => {
                let _ = reply.send(self.handle_register(username, sender).await);
            }
            ServerCommand::Unregister { username } => {
                self.handle_unregister(username).await;
            }
            ServerCommand::Broadcast { from, line } => {
                self.broadcast(line, Some(&from)).await;
            }
            ServerCommand::Private { from, to, body } => {
                self.send_private(from, to, body).await;
            }
            ServerCommand::ResolvePeer { username, reply } => {
                let _ = reply.send(self.registry.lookup(&username).map(|p| p.sender()));
            }
        }
    }

    /// Register a new identity; on success, roster notice + join broadcast
    async fn handle_register(
        &mut self,
        username: Username,
        sender: mpsc::Sender<Frame>,
    ) -> Result<(), DuplicateIdentity> {
        let peer = Peer::new(username.clone(), sender);
        self.registry.register(peer)?;
        info!("{} joined the chat ({} online)", username, self.registry.len());

        let others = self.registry.usernames_except(&username);
        let roster = if others.is_empty() {
            message::server_notice("You're the first user online.")
        } else {
            message::server_notice(format!("Currently online: {}", others.join(", ")))
        };
        if let Some(peer) = self.registry.lookup(&username) {
            let _ = peer.send(roster).await;
        }

        self.broadcast(format!("[Server]: {} joined the chat.", username), Some(&username))
            .await;
        Ok(())
    }

    /// Drop an identity and announce the departure to everyone remaining
    async fn handle_unregister(&mut self, username: Username) {
        if self.registry.unregister(&username).is_none() {
            return;
        }
        info!("{} left the chat ({} online)", username, self.registry.len());
        self.broadcast(format!("[Server]: {} left the chat.", username), None)
            .await;
    }

    /// Best-effort fan-out to every registered peer except `excluding`
    ///
    /// A failed send is logged and skipped; the stale entry is not pruned
    /// here, it disappears when its own handler unregisters.
    async fn broadcast(&self, line: String, excluding: Option<&Username>) {
        for peer in self.registry.others(excluding) {
            if peer.send(Frame::Text(line.clone())).await.is_err() {
                warn!("Broadcast to {} failed (writer gone)", peer.username);
            }
        }
    }

    /// Deliver a private line, or tell the sender the target is missing
    async fn send_private(&self, from: Username, to: Username, body: String) {
        match self.registry.lookup(&to) {
            Some(peer) => {
                debug!("Private message {} -> {}", from, to);
                let _ = peer.send(message::private_line(&from, &body)).await;
            }
            None => {
                debug!("Private message {} -> unknown '{}'", from, to);
                if let Some(sender) = self.registry.lookup(&from) {
                    let _ = sender.send(message::target_not_found(to.as_str())).await;
                }
            }
        }
    }
}

/// Accept connections on `listener` and serve them until the process ends
///
/// Spawns the relay actor, then one handler task per accepted socket. At
/// most `max_connections` are served concurrently; sockets beyond the cap
/// get a rejection notice and are closed without a handler.
pub async fn serve(
    listener: TcpListener,
    keypair: Arc<ServerKeypair>,
    max_connections: usize,
) -> std::io::Result<()> {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
    tokio::spawn(RelayServer::new(cmd_rx).run());

    let limiter = Arc::new(Semaphore::new(max_connections));

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let Ok(permit) = limiter.clone().try_acquire_owned() else {
                    warn!("Connection from {} rejected: server full", addr);
                    tokio::spawn(handler::reject_over_capacity(stream));
                    continue;
                };

                info!("New connection from {}", addr);
                let cmd_tx = cmd_tx.clone();
                let keypair = keypair.clone();

                tokio::spawn(async move {
                    if let Err(e) = handler::handle_connection(stream, cmd_tx, keypair).await {
                        error!("Connection handler error: {}", e);
                    }
                    drop(permit);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
