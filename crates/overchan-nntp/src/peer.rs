//! Peer session handles and the dispatcher-facing channel pair.
//!
//! Sessions never hold a daemon back-pointer: they get a
//! [`DispatcherHandle`] (channel endpoints) and publish a [`PeerHandle`]
//! the dispatcher keeps in its peer table. Producers never touch the
//! socket; each session drains its own channel.

use crate::policy::FeedPolicy;
use tokio::sync::mpsc;

/// Which sub-protocol an outbound session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedMode {
    /// CHECK/TAKETHIS streaming.
    Stream,
    /// ARTICLE pull.
    Reader,
}

impl FeedMode {
    /// Suffix used in peer names (`<feed>-stream` / `<feed>-reader`).
    pub fn suffix(&self) -> &'static str {
        match self {
            FeedMode::Stream => "stream",
            FeedMode::Reader => "reader",
        }
    }
}

/// A live outbound peer as the dispatcher sees it.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    /// Peer name: feed name plus mode suffix.
    pub name: String,
    /// Newsgroup policy for this feed.
    pub policy: FeedPolicy,
    /// Session mode.
    pub mode: FeedMode,
    /// Offer our full inventory to this peer right after it registers.
    pub sync_on_connect: bool,
    /// Message-IDs for the session to offer (stream) or pull (reader).
    pub tx: mpsc::Sender<String>,
}

/// Channel endpoints a session uses to talk back to the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    /// Temp filenames (Message-IDs) ready for ingestion.
    pub infeed_load: mpsc::Sender<String>,
    /// Register a live outbound peer.
    pub register_peer: mpsc::Sender<PeerHandle>,
    /// Deregister a peer by name.
    pub deregister_peer: mpsc::Sender<String>,
}
