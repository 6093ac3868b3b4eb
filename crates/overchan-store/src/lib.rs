//! # overchan-store
//!
//! Content-addressed article storage:
//! - `incoming/` temp files with per-Message-ID dedup locking
//! - `store/` committed article files named by Message-ID
//! - `attachments/` immutable files named `base32(sha512(bytes)) + ext`
//! - `thumbs/` derivatives rendered by external tools
//!
//! The store is authoritative over the index: committed files exist
//! before registration, and attachment writes are idempotent no-ops when
//! the content address is already present.

mod error;
mod store;
mod thumbnail;

pub use error::{StoreError, StoreResult};
pub use store::{ArticleStore, StoreConfig};
pub use thumbnail::{is_audio, is_image, Thumbnailer};
