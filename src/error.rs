//! Error types

use std::fmt;
use std::io;

use crate::peer::PeerError;
use crate::registry::DirectoryError;
use crate::signal::SignalError;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),
    /// Signaling codec error
    Signal(SignalError),
    /// Negotiated connection error
    Peer(PeerError),
    /// Session directory error
    Directory(DirectoryError),
    /// Invalid configuration
    Config(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Signal(e) => write!(f, "Signaling error: {}", e),
            Error::Peer(e) => write!(f, "Peer error: {}", e),
            Error::Directory(e) => write!(f, "Directory error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Signal(e) => Some(e),
            Error::Peer(e) => Some(e),
            Error::Directory(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<SignalError> for Error {
    fn from(e: SignalError) -> Self {
        Error::Signal(e)
    }
}

impl From<PeerError> for Error {
    fn from(e: PeerError) -> Self {
        Error::Peer(e)
    }
}

impl From<DirectoryError> for Error {
    fn from(e: DirectoryError) -> Self {
        Error::Directory(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_and_source() {
        let err: Error = PeerError::Closed.into();
        assert_eq!(err.to_string(), "Peer error: Connection closed");
        assert!(std::error::Error::source(&err).is_some());

        let err = Error::Config("invalid PORT: x".into());
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_from_io() {
        let err: Error = io::Error::new(io::ErrorKind::AddrInUse, "taken").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
