//! Store error types.

use thiserror::Error;

/// Article store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A temp file for this Message-ID is already open.
    #[error("article already being received: {0}")]
    Busy(String),

    /// Message-ID failed validation before touching the filesystem.
    #[error("invalid message id: {0}")]
    InvalidMessageId(String),

    /// Article file is missing.
    #[error("no such article: {0}")]
    NotFound(String),

    /// Thumbnail subprocess failed.
    #[error("thumbnailer failed: {0}")]
    Thumbnail(String),

    /// Wire format error while reading an article.
    #[error("wire error: {0}")]
    Wire(#[from] overchan_wire::WireError),

    /// Index error while registering.
    #[error("index error: {0}")]
    Index(#[from] overchan_index::IndexError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
