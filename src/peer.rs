//! Peer struct definition
//!
//! A registered connection as the rest of the server sees it: the claimed
//! username plus the channel feeding that connection's writer task. The
//! socket itself stays owned by the connection's handler.

use tokio::sync::mpsc;

use crate::error::AppError;
use crate::message::Frame;
use crate::types::Username;

/// A live, registered connection handle
#[derive(Debug)]
pub struct Peer {
    /// The identity this connection registered under
    pub username: Username,
    /// Server → connection frame channel
    sender: mpsc::Sender<Frame>,
}

impl Peer {
    /// Create a handle from a claimed username and its writer channel
    pub fn new(username: Username, sender: mpsc::Sender<Frame>) -> Self {
        Self { username, sender }
    }

    /// Queue a frame for this connection
    ///
    /// Returns an error if the writer task is gone (connection closed).
    pub async fn send(&self, frame: Frame) -> Result<(), AppError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    /// A clone of the underlying channel, for direct streaming (file relay)
    pub fn sender(&self) -> mpsc::Sender<Frame> {
        self.sender.clone()
    }
}
