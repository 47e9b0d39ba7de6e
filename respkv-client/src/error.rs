//! # Client Errors
//!
//! Purpose: One error type for every failure the client can surface, split so
//! callers can branch on the kind without matching on message text.
//!
//! ## Design Principles
//! 1. **Typed Absence**: A missing value is `NotFound`, never a string compare.
//! 2. **Health Classification**: Each error knows whether the connection it
//!    happened on is still in sync with the server.
//! 3. **Retry Classification**: Only transport resets and premature closes are
//!    transient; everything else propagates immediately.

use std::io;

use thiserror::Error;

/// Result type for the client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure on an established connection.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Dialing the server failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialed.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Address could not be resolved to a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed or unexpected frame.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server returned an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// Bulk reply was absent (`$-1`): the key or field has no value.
    #[error("key does not exist")]
    NotFound,

    /// Reply kind did not match what the command returns.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        ClientError::Protocol(message.into())
    }

    /// Returns true for failures worth one reconnect-and-retry.
    ///
    /// These are the ways an idle pooled connection goes stale: the peer
    /// reset it, the pipe broke on write, or the peer closed cleanly and the
    /// read hit end of stream.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Returns true when the value was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound)
    }

    /// Returns true when the reply was consumed completely, so the connection
    /// can serve the next request.
    pub fn leaves_connection_usable(&self) -> bool {
        matches!(self, ClientError::Server(_) | ClientError::NotFound)
    }
}

/// Turns `NotFound` into `Ok(None)` for read-style commands.
pub trait OptionalExt<T> {
    /// Maps `Err(NotFound)` to `Ok(None)` and `Ok(v)` to `Ok(Some(v))`.
    fn optional(self) -> ClientResult<Option<T>>;
}

impl<T> OptionalExt<T> for ClientResult<T> {
    fn optional(self) -> ClientResult<Option<T>> {
        match self {
            Ok(value) => Ok(Some(value)),
            Err(ClientError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
