//! # overchan-index
//!
//! The article index interface.
//!
//! The relational index proper is an external collaborator; this crate
//! names its interface ([`Database`]) and ships the in-process
//! [`MemoryIndex`] the daemon and tests run against. The store stays
//! authoritative: the index only carries lookup, per-group threading, and
//! moderation-key tables.

mod memory;

pub use memory::MemoryIndex;

use thiserror::Error;

/// Index errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// No per-group settings recorded for this newsgroup.
    #[error("unknown newsgroup: {0}")]
    UnknownGroup(String),

    /// Backend failure.
    #[error("index backend error: {0}")]
    Backend(String),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// The `{MessageID, Newsgroup}` pair that flows through every fanout
/// channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleEntry {
    /// Article Message-ID.
    pub msgid: String,
    /// First newsgroup of the article.
    pub newsgroup: String,
}

impl ArticleEntry {
    /// Create an entry.
    pub fn new(msgid: impl Into<String>, newsgroup: impl Into<String>) -> Self {
        Self {
            msgid: msgid.into(),
            newsgroup: newsgroup.into(),
        }
    }
}

/// Metadata the index records per article.
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    /// Message-ID.
    pub msgid: String,
    /// Newsgroup.
    pub newsgroup: String,
    /// Thread root reference, empty for root posts.
    pub reference: String,
}

impl ArticleRecord {
    /// Build a record from a parsed article (the signed view when the
    /// envelope verified, per the ingest pipeline).
    pub fn from_article(article: &overchan_wire::Article) -> Self {
        Self {
            msgid: article.message_id().to_string(),
            newsgroup: article.newsgroup().to_string(),
            reference: article.reference().to_string(),
        }
    }
}

/// Interface of the article index collaborator.
pub trait Database: Send + Sync {
    /// Record an article: lookup entry plus thread membership. Re-registering
    /// a known Message-ID is a no-op.
    fn register_article(&self, record: &ArticleRecord) -> IndexResult<()>;

    /// Record the author pubkey of a verified signed article.
    fn register_signed(&self, msgid: &str, pubkey_hex: &str) -> IndexResult<()>;

    /// Do we know this Message-ID?
    fn has_article(&self, msgid: &str) -> IndexResult<bool>;

    /// Remove an article from lookup and threading.
    fn unregister_article(&self, msgid: &str) -> IndexResult<()>;

    /// Total number of registered articles.
    fn article_count(&self) -> IndexResult<u64>;

    /// Every known article entry (startup sync).
    fn all_articles(&self) -> IndexResult<Vec<ArticleEntry>>;

    /// Root posts of a group, most recent activity first.
    fn group_roots(&self, group: &str) -> IndexResult<Vec<String>>;

    /// All articles of a thread, root included.
    fn thread_members(&self, root: &str) -> IndexResult<Vec<String>>;

    /// Threads shown per page for a group.
    fn threads_per_page(&self, group: &str) -> IndexResult<u32>;

    /// Pages kept per board for a group.
    fn pages_per_board(&self, group: &str) -> IndexResult<u32>;

    /// Grant a pubkey global moderation rights.
    fn mark_mod_pubkey_global(&self, pubkey_hex: &str) -> IndexResult<()>;

    /// Does a pubkey hold global moderation rights?
    fn is_mod_pubkey_global(&self, pubkey_hex: &str) -> IndexResult<bool>;

    /// Recorded author pubkey for an article, if any.
    fn signed_pubkey(&self, msgid: &str) -> IndexResult<Option<String>>;
}
