//! Client error types.
//!
//! Every failure mode of the wire protocol client maps to a distinct
//! [`ClientError`] variant so callers can decide whether to reconnect,
//! reduce the proposed version set, or abort. The client itself never
//! retries or silently recovers.

use thiserror::Error;

/// Ouroboros client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// TCP connection establishment failed.
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        /// The `host:port` that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Peer closed the connection before sending any header bytes for an
    /// expected reply.
    #[error("Peer closed the connection without responding")]
    NoResponse,

    /// Frame header bytes did not have the fixed 8-byte size.
    #[error("Malformed frame header: expected {expected} bytes, got {actual}")]
    MalformedHeader {
        /// Required header size.
        expected: usize,
        /// Size actually supplied.
        actual: usize,
    },

    /// A header field value exceeded its bit width.
    #[error("{field} out of range: {value} exceeds maximum {max}")]
    InvalidRange {
        /// Name of the offending field.
        field: &'static str,
        /// Value that was supplied.
        value: u64,
        /// Largest value the field can carry on the wire.
        max: u64,
    },

    /// Payload bytes did not parse as CBOR or did not match the expected
    /// message shape. The raw bytes are kept for diagnosis.
    #[error("Decode error: {reason} ({} payload bytes)", .bytes.len())]
    Decode {
        /// What went wrong.
        reason: String,
        /// The undecodable payload.
        bytes: Vec<u8>,
    },

    /// Peer refused the proposed version set. No automatic downgrade.
    #[error("Version proposal refused by peer: {reason}")]
    VersionMismatch {
        /// The peer's refuse payload, rendered for reporting.
        reason: String,
    },

    /// Session state machine misuse, e.g. an intersect request before the
    /// handshake confirmed a version.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Transport-level failure: partial write, reset connection, or a
    /// stream closed mid-message.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}
