//! In-memory index implementation.

use crate::{ArticleEntry, ArticleRecord, Database, IndexError, IndexResult};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Default)]
struct ThreadState {
    group: String,
    members: Vec<String>,
    last_activity: u64,
}

#[derive(Debug, Default)]
struct Inner {
    /// msgid -> record
    articles: HashMap<String, ArticleRecord>,
    /// root msgid -> thread
    threads: HashMap<String, ThreadState>,
    /// msgid -> author pubkey
    signed: HashMap<String, String>,
    /// pubkeys with global moderation rights
    global_mod_keys: HashSet<String>,
    /// group -> (threads_per_page, pages_per_board)
    group_pages: HashMap<String, (u32, u32)>,
    /// activity clock
    seq: u64,
}

/// In-process [`Database`] implementation backed by hash maps.
///
/// Serializes its own writes behind a single lock, like the external
/// index it stands in for.
#[derive(Default)]
pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure per-group page bounds (admin/tooling surface).
    pub fn set_group_pages(&self, group: &str, threads_per_page: u32, pages_per_board: u32) {
        self.inner
            .write()
            .group_pages
            .insert(group.to_string(), (threads_per_page, pages_per_board));
    }
}

impl Database for MemoryIndex {
    fn register_article(&self, record: &ArticleRecord) -> IndexResult<()> {
        let mut inner = self.inner.write();
        if inner.articles.contains_key(&record.msgid) {
            debug!(msgid = %record.msgid, "already registered");
            return Ok(());
        }

        inner.seq += 1;
        let seq = inner.seq;

        // a reply whose root we know bumps that thread, everything else
        // roots a new one
        let root = if !record.reference.is_empty() && inner.threads.contains_key(&record.reference)
        {
            record.reference.clone()
        } else {
            record.msgid.clone()
        };

        let thread = inner.threads.entry(root).or_insert_with(|| ThreadState {
            group: record.newsgroup.clone(),
            ..Default::default()
        });
        thread.members.push(record.msgid.clone());
        thread.last_activity = seq;

        inner.articles.insert(record.msgid.clone(), record.clone());
        Ok(())
    }

    fn register_signed(&self, msgid: &str, pubkey_hex: &str) -> IndexResult<()> {
        self.inner
            .write()
            .signed
            .insert(msgid.to_string(), pubkey_hex.to_string());
        Ok(())
    }

    fn has_article(&self, msgid: &str) -> IndexResult<bool> {
        Ok(self.inner.read().articles.contains_key(msgid))
    }

    fn unregister_article(&self, msgid: &str) -> IndexResult<()> {
        let mut inner = self.inner.write();
        inner.articles.remove(msgid);
        inner.signed.remove(msgid);
        // removing a root drops the whole thread entry; surviving replies
        // stay in the article table until expired themselves
        if inner.threads.remove(msgid).is_none() {
            for thread in inner.threads.values_mut() {
                thread.members.retain(|m| m != msgid);
            }
        }
        Ok(())
    }

    fn article_count(&self) -> IndexResult<u64> {
        Ok(self.inner.read().articles.len() as u64)
    }

    fn all_articles(&self) -> IndexResult<Vec<ArticleEntry>> {
        Ok(self
            .inner
            .read()
            .articles
            .values()
            .map(|r| ArticleEntry::new(r.msgid.clone(), r.newsgroup.clone()))
            .collect())
    }

    fn group_roots(&self, group: &str) -> IndexResult<Vec<String>> {
        let inner = self.inner.read();
        let mut roots: Vec<(&String, u64)> = inner
            .threads
            .iter()
            .filter(|(_, t)| t.group == group)
            .map(|(root, t)| (root, t.last_activity))
            .collect();
        roots.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(roots.into_iter().map(|(root, _)| root.clone()).collect())
    }

    fn thread_members(&self, root: &str) -> IndexResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .threads
            .get(root)
            .map(|t| t.members.clone())
            .unwrap_or_default())
    }

    fn threads_per_page(&self, group: &str) -> IndexResult<u32> {
        self.inner
            .read()
            .group_pages
            .get(group)
            .map(|&(tpp, _)| tpp)
            .ok_or_else(|| IndexError::UnknownGroup(group.to_string()))
    }

    fn pages_per_board(&self, group: &str) -> IndexResult<u32> {
        self.inner
            .read()
            .group_pages
            .get(group)
            .map(|&(_, ppb)| ppb)
            .ok_or_else(|| IndexError::UnknownGroup(group.to_string()))
    }

    fn mark_mod_pubkey_global(&self, pubkey_hex: &str) -> IndexResult<()> {
        self.inner
            .write()
            .global_mod_keys
            .insert(pubkey_hex.to_string());
        Ok(())
    }

    fn is_mod_pubkey_global(&self, pubkey_hex: &str) -> IndexResult<bool> {
        Ok(self.inner.read().global_mod_keys.contains(pubkey_hex))
    }

    fn signed_pubkey(&self, msgid: &str) -> IndexResult<Option<String>> {
        Ok(self.inner.read().signed.get(msgid).cloned())
    }
}
