//! Errors for the stdio transport.
//!
//! Command failures never surface here: they become `CACHE_ERROR` replies.
//! These cover the channel itself.

/// Structured errors for the stdio transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Reading input or writing output failed.
    #[error("TRANSPORT_IO: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound envelope could not be encoded.
    #[error("SERIALIZATION: {0}")]
    Encode(#[from] serde_json::Error),

    /// The output writer task stopped abnormally.
    #[error("TRANSPORT_IO: writer task failed: {0}")]
    Writer(String),
}
