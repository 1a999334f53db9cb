//! Connection registry
//!
//! The single shared mapping of username → live connection handle. The
//! relay actor owns the only instance, so every operation here runs in one
//! exclusion domain; there is no lock to hold across I/O.

use std::collections::HashMap;

use crate::error::DuplicateIdentity;
use crate::peer::Peer;
use crate::types::Username;

/// Username → Peer mapping for all registered connections
#[derive(Debug, Default)]
pub struct Registry {
    peers: HashMap<Username, Peer>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic check-then-insert
    ///
    /// Fails without mutating anything if the username is already live.
    pub fn register(&mut self, peer: Peer) -> Result<(), DuplicateIdentity> {
        if self.peers.contains_key(&peer.username) {
            return Err(DuplicateIdentity(peer.username));
        }
        self.peers.insert(peer.username.clone(), peer);
        Ok(())
    }

    /// Remove an entry; no-op if absent
    pub fn unregister(&mut self, username: &Username) -> Option<Peer> {
        self.peers.remove(username)
    }

    /// Point lookup for private and file delivery
    pub fn lookup(&self, username: &Username) -> Option<&Peer> {
        self.peers.get(username)
    }

    /// Snapshot of every peer except the one named, for broadcast fan-out
    ///
    /// Iteration order is unspecified and irrelevant to correctness.
    pub fn others(&self, excluding: Option<&Username>) -> Vec<&Peer> {
        self.peers
            .values()
            .filter(|peer| Some(&peer.username) != excluding)
            .collect()
    }

    /// Usernames of everyone but the one named, for the roster notice
    pub fn usernames_except(&self, excluding: &Username) -> Vec<String> {
        self.peers
            .keys()
            .filter(|name| *name != excluding)
            .map(|name| name.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
