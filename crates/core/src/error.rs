//! Unified error types for keepr.
//!
//! Display strings carry a stable upper-case code prefix so page-side callers
//! can render them directly from `failed[].error` and `CACHE_ERROR` replies.

use tokio_rusqlite::rusqlite;

/// Unified error types for the keepr controller and its callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A URL could not be parsed or resolved.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The network answered outside the success range.
    #[error("FETCH_ERROR: failed fetch {url} (status {status})")]
    Fetch { url: String, status: u16 },

    /// The request never produced a response.
    #[error("NETWORK_ERROR: failed fetch {url}: {reason}")]
    Network { url: String, reason: String },

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Store operation failed.
    #[error("STORE_IO: {0}")]
    Store(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_IO: migration failed: {0}")]
    MigrationFailed(String),

    /// A stored record or protocol message could not be (de)serialized.
    #[error("SERIALIZATION: {0}")]
    Serialization(String),

    /// No reply arrived within the caller-side timeout window.
    #[error("PROTOCOL_TIMEOUT: no reply to {command} within {timeout_ms}ms")]
    ProtocolTimeout { command: String, timeout_ms: u64 },

    /// There is no active controller to talk to.
    #[error("NO_ACTIVE_CONTROLLER")]
    NoActiveController,

    /// The controller did not recognize the command.
    #[error("UNKNOWN_COMMAND: {0}")]
    UnknownCommand(String),

    /// Command handling failed, or the controller replied with `CACHE_ERROR`.
    #[error("CACHE_ERROR: {0}")]
    Dispatch(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Store(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Store(tokio_rusqlite::Error::Close(c)),
            _ => Error::Store(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Store(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
