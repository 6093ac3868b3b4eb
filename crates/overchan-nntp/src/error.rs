//! NNTP session error types.

use thiserror::Error;

/// NNTP session errors.
#[derive(Error, Debug)]
pub enum NntpError {
    /// Peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Peer sent something the protocol does not allow here.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Peer response had an unexpected code.
    #[error("unexpected response: {code} {line}")]
    BadResponse {
        /// Numeric response code.
        code: u16,
        /// Rest of the response line.
        line: String,
    },

    /// Handshake with the peer failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Proxy refused or garbled the CONNECT.
    #[error("proxy error: {0}")]
    Proxy(String),

    /// A line exceeded the codec bound.
    #[error("line too long: {0} bytes")]
    LineTooLong(usize),

    /// Read timed out.
    #[error("read timeout")]
    Timeout,

    /// Feed policy pattern failed to compile.
    #[error("invalid policy pattern: {0}")]
    InvalidPolicy(String),

    /// Store operation failed mid-session.
    #[error("store error: {0}")]
    Store(#[from] overchan_store::StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for NNTP operations.
pub type NntpResult<T> = Result<T, NntpError>;
