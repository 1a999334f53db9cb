//! Basic type definitions for the chat relay
//!
//! Provides the `Username` newtype: the unique, client-chosen identity
//! that keys the connection registry.

/// Unique connection identity (newtype pattern)
///
/// A non-empty, trimmed, case-sensitive string claimed by the client
/// with its first frame. Implements Hash and Eq for use as a HashMap key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Parse a username from raw client text.
    ///
    /// Leading/trailing whitespace is trimmed; an empty result is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// The username as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
