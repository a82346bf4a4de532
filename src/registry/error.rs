//! Directory error types
//!
//! Error types for session directory operations.

use super::entry::ConnectionId;

/// Error type for directory operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// Connection is not the registered broadcaster
    NotBroadcaster(ConnectionId),
    /// Nobody is broadcasting
    NoBroadcaster,
    /// Broadcaster is registered but no track has arrived yet
    StreamNotReady,
    /// Connection already holds the other role
    RoleConflict(ConnectionId),
}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DirectoryError::NotBroadcaster(id) => write!(f, "Connection {} is not the broadcaster", id),
            DirectoryError::NoBroadcaster => write!(f, "No broadcaster"),
            DirectoryError::StreamNotReady => write!(f, "Broadcast stream not ready"),
            DirectoryError::RoleConflict(id) => {
                write!(f, "Connection {} already holds another role", id)
            }
        }
    }
}

impl std::error::Error for DirectoryError {}
