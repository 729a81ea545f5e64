//! Error types for the trusted RPC transport.

use std::io;
use thiserror::Error;

use crate::protocol::handshake::Role;

/// Result type alias for RPC operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for RPC operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Handshake failed before the connection became trusted.
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Connection-related errors.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Protocol-level framing errors.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Codec errors during serialization/deserialization.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Application fault reported by the remote peer for one call.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Channel closed unexpectedly.
    #[error("Channel closed")]
    ChannelClosed,
}

/// Handshake-specific errors.
///
/// `SecretNotConfigured` is a local configuration fault detected before any
/// network I/O; the other variants are protocol outcomes of the exchange.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// No trust token was configured for this side of the handshake.
    #[error("{role} secret not configured")]
    SecretNotConfigured {
        /// Which handshake role was missing its secret.
        role: Role,
    },

    /// The peer's response digest did not match the expected digest.
    #[error("token mismatch")]
    TokenMismatch,

    /// The peer sent a rejection verdict instead of the acceptance tag.
    #[error("rejected by peer")]
    Rejected,
}

/// Connection-specific errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to establish a connection.
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        /// The address we tried to connect to.
        addr: std::net::SocketAddr,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The peer went away before or while a call was outstanding.
    #[error("Connection closed unexpectedly")]
    Closed,
}

/// Protocol-level framing errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The connection closed after a partial header or payload.
    ///
    /// Distinct from a clean end-of-stream at a frame boundary, which is
    /// reported as stream termination rather than an error.
    #[error("Connection closed mid-frame")]
    TruncatedFrame,

    /// Frame too large.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Size of the offending frame.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },
}

/// Codec-related errors.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Failed to serialize: {0}")]
    SerializationFailed(String),

    /// Deserialization failed.
    #[error("Failed to deserialize: {0}")]
    DeserializationFailed(String),
}

/// An application fault raised by the remote peer for a single call.
///
/// On the wire this is the flat string `"Kind: message"`; it is parsed back
/// into its parts on receipt and only rendered as a string again at
/// serialization boundaries.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Fault category, e.g. `NameError` or `TypeError`.
    pub kind: String,
    /// Human-readable fault description.
    pub message: String,
}

impl RemoteError {
    /// Parse the wire rendering of a fault back into its parts.
    #[must_use]
    pub fn from_wire(rendered: &str) -> Self {
        match rendered.split_once(": ") {
            Some((kind, message)) if !kind.is_empty() => Self {
                kind: kind.to_owned(),
                message: message.to_owned(),
            },
            _ => Self {
                kind: "RemoteError".to_owned(),
                message: rendered.to_owned(),
            },
        }
    }
}
