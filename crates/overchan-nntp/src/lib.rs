//! # overchan-nntp
//!
//! The NNTP session engine:
//! - line framing codec over TCP
//! - inbound sessions (CHECK/TAKETHIS streaming, reader-mode ARTICLE)
//! - outbound sessions (streaming push and reader pull), dialed directly
//!   or through SOCKS4a
//! - per-feed newsgroup policy
//!
//! Sessions talk to the daemon purely through channels: a
//! [`DispatcherHandle`] inward, a registered [`PeerHandle`] outward.

mod body;
mod codec;
mod dial;
mod error;
mod outbound;
mod peer;
mod policy;
mod proto;
mod session;

pub use body::{drain_body, read_line, receive_body_to_temp, send_body, NntpStream};
pub use codec::{LineCodec, MAX_LINE_LEN};
pub use dial::{dial, ProxyConfig};
pub use error::{NntpError, NntpResult};
pub use outbound::{run_reader_feed, run_stream_feed, FeedConfig};
pub use peer::{DispatcherHandle, FeedMode, PeerHandle};
pub use policy::{FeedPolicy, PolicyRule};
pub use proto::{code, dot_stuff, dot_unstuff, is_terminator, parse_response, IMPLEMENTATION, READ_TIMEOUT};
pub use session::InboundSession;
