//! Error types for the heartbeat core.
//!
//! None of these reach the scheduler or a front end: the heartbeat and
//! registry resolve every failure to a state value or a no-op. They exist so
//! the layers below can say what went wrong before it is logged.

use thiserror::Error;

/// Errors produced by transports and connection setup.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not open a connection to the peer.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The connection is closed, or closed while a call was outstanding.
    #[error("Connection closed")]
    Closed,

    /// The peer did not answer in time.
    #[error("Call timed out")]
    Timeout,

    /// The peer answered with an error reply.
    #[error("Remote error: {0}")]
    Remote(String),

    /// The server refused the hello handshake.
    #[error("Hello rejected: {0}")]
    Rejected(String),

    /// A frame could not be encoded or decoded.
    #[error("Malformed frame: {0}")]
    Codec(#[from] serde_json::Error),

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for the heartbeat core.
pub type Result<T> = std::result::Result<T, Error>;
