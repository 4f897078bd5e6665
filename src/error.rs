//! Error types surfaced by the client.

use std::error::Error as StdError;
use std::fmt;

/// Errors that can occur while talking to a Kyoto Tycoon server.
#[derive(Debug)]
pub enum Error {
    /// A key or value could not be represented on the wire (length overflow).
    InvalidInput(String),

    /// Opening, reading from, or writing to the underlying socket failed.
    ConnectionError(std::io::Error),

    /// The server replied in a way that violates the binary protocol.
    Protocol(ProtocolError),

    /// The embedded server could not be started.
    EmbeddedStartupError(String),
}

/// Protocol-level failures: the bytes came back, but they don't make sense.
#[derive(Debug)]
pub enum ProtocolError {
    /// The server responded with the `ERROR` magic (`0xBF`).
    ServerError,

    /// The server responded with a magic byte this client doesn't recognize.
    UnknownMagic(u8),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Error::ConnectionError(err) => write!(f, "connection error: {}", err),
            Error::Protocol(err) => write!(f, "protocol error: {}", err),
            Error::EmbeddedStartupError(msg) => write!(f, "embedded startup error: {}", msg),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ServerError => write!(f, "server returned error magic (0xBF)"),
            ProtocolError::UnknownMagic(m) => write!(f, "unknown response magic: {:#04x}", m),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::ConnectionError(err) => Some(err),
            Error::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl StdError for ProtocolError {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::ConnectionError(err)
    }
}

impl From<ProtocolError> for Error {
    fn from(err: ProtocolError) -> Self {
        Error::Protocol(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::ConnectionError(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "timed out waiting on socket",
        ))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
