//! Error types for meridian-client.

use thiserror::Error;

/// Main error type for all client operations.
///
/// The variants follow the driver taxonomy: transport failures, wire-level
/// violations, unusable configuration, and caller misuse are kept distinct so
/// callers can react per class instead of string-matching messages.
#[derive(Debug, Error)]
pub enum MeridianError {
    /// Transport-level I/O failure while connecting, reading, or writing.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// Malformed or unexpected frame, version mismatch, unknown type tag.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Unsupported option combination, e.g. a compression algorithm the
    /// server does not offer.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller misuse: operating on a closed connection, missing bind
    /// parameter, or a query the server rejected.
    #[error("programming error: {0}")]
    Programming(String),

    /// The connection closed while a request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// Every stream id is occupied by an in-flight request.
    #[error("all stream ids are in use")]
    ResourceExhausted,
}

/// Result type alias using MeridianError.
pub type Result<T> = std::result::Result<T, MeridianError>;
