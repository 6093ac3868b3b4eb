//! # overchan-wire
//!
//! Article wire format for the relay:
//! - RFC 5322 header block with an ordered, case-insensitive multimap
//! - MIME multipart bodies (first text/plain part is the body, the rest
//!   are content-addressed attachments)
//! - `message/rfc822` signed envelopes carrying an Ed25519-signed inner
//!   article
//! - deterministic serialization with `\r\n` on the wire and `\n` on disk

mod article;
mod attachment;
mod error;
mod headers;
mod msgid;
mod parse;
mod serialize;

pub use article::{derive_boundary, Article, CONTROL_GROUP, FRONTEND_GROUP_PREFIX};
pub use attachment::{ext_of, Attachment};
pub use error::{WireError, WireResult};
pub use headers::{names, Headers};
pub use msgid::{gen_message_id, valid_message_id, MAX_MESSAGE_ID_LEN};
pub use parse::{parse_article, parse_headers, parse_media_type, read_article};
pub use serialize::{article_bytes, write_article};
