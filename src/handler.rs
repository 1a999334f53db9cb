//! Per-connection control loop
//!
//! Each accepted socket gets one handler task walking the connection state
//! machine: AwaitingIdentity (first frame claims a username), Registered
//! (read, classify, dispatch), Closed (unregister and announce the
//! departure). The handler owns the read half; a companion writer task
//! drains the connection's frame channel into the write half, so the relay
//! actor and other handlers only ever queue frames.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::codec::{self, Command};
use crate::crypto::ServerKeypair;
use crate::error::AppError;
use crate::message::{self, Frame};
use crate::relay;
use crate::server::ServerCommand;
use crate::types::Username;

/// Upper bound on a single inbound read
pub const READ_BUFFER_SIZE: usize = 4096;

/// Buffer size of a connection's outbound frame channel
const FRAME_BUFFER_SIZE: usize = 32;

/// Serve one client connection to completion
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    keypair: Arc<ServerKeypair>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    let (mut reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<Frame>(FRAME_BUFFER_SIZE);
    let write_task = tokio::spawn(write_loop(writer, out_rx));

    // AwaitingIdentity: the first frame is the raw identity claim
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        debug!("{} closed before claiming an identity", peer_addr);
        drop(out_tx);
        let _ = write_task.await;
        return Ok(());
    }

    let claim = String::from_utf8_lossy(&buf[..n]);
    let Some(username) = Username::parse(&claim) else {
        warn!("Empty identity claim from {}", peer_addr);
        let _ = out_tx
            .send(message::server_notice("Invalid username. Connection rejected."))
            .await;
        drop(out_tx);
        let _ = write_task.await;
        return Ok(());
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ServerCommand::Register {
            username: username.clone(),
            sender: out_tx.clone(),
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    match reply_rx.await.map_err(|_| AppError::ChannelSend)? {
        Ok(()) => {}
        Err(_) => {
            // Never registered: close without a departure broadcast
            warn!("Rejected duplicate login for '{}' from {}", username, peer_addr);
            let _ = out_tx
                .send(message::server_notice(
                    "Duplicate login detected. Connection rejected.",
                ))
                .await;
            drop(out_tx);
            let _ = write_task.await;
            return Ok(());
        }
    }
    info!("{} registered from {}", username, peer_addr);

    // Registered: dispatch until the peer goes away
    let result = dispatch_loop(&mut reader, &cmd_tx, &out_tx, &keypair, &username).await;

    // Closed: the actor removes the entry and announces the departure
    let _ = cmd_tx
        .send(ServerCommand::Unregister {
            username: username.clone(),
        })
        .await;
    drop(out_tx);
    let _ = write_task.await;
    info!("{} disconnected", username);

    result
}

/// Read frames and dispatch them until EOF or a transport failure
async fn dispatch_loop(
    reader: &mut OwnedReadHalf,
    cmd_tx: &mpsc::Sender<ServerCommand>,
    out_tx: &mpsc::Sender<Frame>,
    keypair: &ServerKeypair,
    username: &Username,
) -> Result<(), AppError> {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            debug!("{} closed the connection", username);
            return Ok(());
        }

        let text = codec::decode_frame(keypair, &buf[..n]);
        match codec::parse_command(&text) {
            Ok(Command::Broadcast { body }) => {
                debug!("Broadcast from {}", username);
                cmd_tx
                    .send(ServerCommand::Broadcast {
                        from: username.clone(),
                        line: format!("[{}]: {}", username, body),
                    })
                    .await
                    .map_err(|_| AppError::ChannelSend)?;
            }
            Ok(Command::Private { to, body }) => match Username::parse(&to) {
                Some(to) => {
                    cmd_tx
                        .send(ServerCommand::Private {
                            from: username.clone(),
                            to,
                            body,
                        })
                        .await
                        .map_err(|_| AppError::ChannelSend)?;
                }
                None => {
                    let _ = out_tx.send(message::target_not_found(&to)).await;
                }
            },
            Ok(Command::FileOffer { to, filename }) => {
                handle_file_offer(reader, cmd_tx, out_tx, username, &to, &filename).await?;
            }
            Err(usage) => {
                debug!("Malformed command from {}: {}", username, text);
                let _ = out_tx.send(message::server_notice(usage)).await;
            }
        }
    }
}

/// Resolve a file offer's target, then run the transfer handshake inline
///
/// The offering connection reads nothing else until the transfer finishes.
async fn handle_file_offer(
    reader: &mut OwnedReadHalf,
    cmd_tx: &mpsc::Sender<ServerCommand>,
    out_tx: &mpsc::Sender<Frame>,
    username: &Username,
    to: &str,
    filename: &str,
) -> Result<(), AppError> {
    let Some(target) = Username::parse(to) else {
        let _ = out_tx.send(message::target_not_found(to)).await;
        return Ok(());
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ServerCommand::ResolvePeer {
            username: target.clone(),
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    match reply_rx.await.map_err(|_| AppError::ChannelSend)? {
        Some(target_tx) => relay::run(reader, username, &target, filename, target_tx, out_tx).await,
        None => {
            debug!("File offer from {} to unknown '{}'", username, target);
            let _ = out_tx.send(message::target_not_found(to)).await;
            Ok(())
        }
    }
}

/// Drain a connection's frame channel into its socket
///
/// Ends when every sender is dropped (normal teardown) or a write fails;
/// either way the socket is shut down so the peer sees a clean close.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        if writer.write_all(frame.as_bytes()).await.is_err() {
            debug!("Socket write failed, ending write task");
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Tell a socket beyond the connection cap to go away
pub async fn reject_over_capacity(mut stream: TcpStream) {
    let _ = stream
        .write_all(b"[Server]: Server is full. Connection rejected.")
        .await;
    let _ = stream.shutdown().await;
}
