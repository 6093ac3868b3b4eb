//! Wire format error types.

use thiserror::Error;

/// Article parsing and serialization errors.
#[derive(Error, Debug)]
pub enum WireError {
    /// Header block was malformed.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Message-ID failed validation.
    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    /// Content-Type could not be parsed.
    #[error("invalid media type: {0}")]
    InvalidMediaType(String),

    /// MIME multipart structure was illegal.
    #[error("invalid multipart body: {0}")]
    InvalidMultipart(String),

    /// Signed envelope was missing its signature headers.
    #[error("signed envelope missing signature headers")]
    MissingSignatureHeaders,

    /// Signed envelope payload's first line has no newline terminator.
    #[error("signed envelope payload is not newline-terminated")]
    UnterminatedEnvelope,

    /// Transfer encoding could not be decoded.
    #[error("bad transfer encoding: {0}")]
    BadEncoding(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;
