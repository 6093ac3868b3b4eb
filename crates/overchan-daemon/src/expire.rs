//! Per-group thread expiration.
//!
//! Single-consumer task: the dispatcher enqueues `(group, keep)` after
//! every commit, and this loop serializes the store/index deletions.

use overchan_store::ArticleStore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One rollover request.
pub type ExpireRequest = (String, usize);

/// Thread pruning core.
pub struct ExpirationCore {
    store: ArticleStore,
}

impl ExpirationCore {
    /// Create the core over a store.
    pub fn new(store: ArticleStore) -> Self {
        Self { store }
    }

    /// Consume rollover requests until the channel closes.
    pub async fn run(self, mut rx: mpsc::Receiver<ExpireRequest>) {
        while let Some((group, keep)) = rx.recv().await {
            if let Err(e) = self.expire_group(&group, keep) {
                warn!(group = %group, error = %e, "expiration failed");
            }
        }
        debug!("expiration loop stopped");
    }

    /// Prune every thread of `group` beyond the `keep` most recently
    /// active roots, deleting the whole thread from store and index.
    pub fn expire_group(&self, group: &str, keep: usize) -> overchan_store::StoreResult<()> {
        let index = self.store.index().clone();
        let roots = index.group_roots(group)?;
        for root in roots.iter().skip(keep) {
            let members = index.thread_members(root)?;
            info!(group = %group, root = %root, posts = members.len(), "expiring thread");
            for msgid in members {
                self.store.delete(&msgid)?;
                index.unregister_article(&msgid)?;
            }
            // root removal drops the thread entry itself
            self.store.delete(root)?;
            index.unregister_article(root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overchan_index::{Database, MemoryIndex};
    use overchan_store::StoreConfig;
    use overchan_wire::Article;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn open() -> (TempDir, ArticleStore, Arc<MemoryIndex>) {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MemoryIndex::new());
        let store = ArticleStore::open(
            StoreConfig::under_root(dir.path()),
            index.clone() as Arc<dyn Database>,
        )
        .unwrap();
        (dir, store, index)
    }

    fn post(store: &ArticleStore, msgid: &str, group: &str) {
        let mut a = Article::plaintext(
            "body",
            "a@b",
            "s",
            "n",
            "relay.example",
            msgid.to_string(),
            group,
        );
        a.pack();
        store.store_post(&a).unwrap();
    }

    #[tokio::test]
    async fn keeps_newest_roots() {
        let (_dir, store, index) = open();
        for i in 1..=5 {
            post(&store, &format!("<r{}@x>", i), "overchan.test");
        }

        let core = ExpirationCore::new(store.clone());
        core.expire_group("overchan.test", 4).unwrap();

        // r1 is the oldest thread and must be gone
        assert!(!store.has("<r1@x>"));
        assert!(!index.has_article("<r1@x>").unwrap());
        for i in 2..=5 {
            let msgid = format!("<r{}@x>", i);
            assert!(store.has(&msgid), "{} should survive", msgid);
        }
    }

    #[tokio::test]
    async fn expires_whole_threads() {
        let (_dir, store, index) = open();
        post(&store, "<r1@x>", "overchan.test");
        // reply keeps r1 alive but r2/r3 push it out anyway when keep=2
        let mut reply = Article::plaintext(
            "re",
            "a@b",
            "s",
            "n",
            "relay.example",
            "<p1@x>".to_string(),
            "overchan.test",
        );
        reply
            .headers
            .add(overchan_wire::names::REFERENCES, "<r1@x>".to_string());
        reply.pack();
        store.store_post(&reply).unwrap();

        post(&store, "<r2@x>", "overchan.test");
        post(&store, "<r3@x>", "overchan.test");

        let core = ExpirationCore::new(store.clone());
        core.expire_group("overchan.test", 2).unwrap();

        // r1's thread (root + reply) is beyond keep=2 and fully removed
        assert!(!store.has("<r1@x>"));
        assert!(!store.has("<p1@x>"));
        assert!(!index.has_article("<p1@x>").unwrap());
        assert!(store.has("<r2@x>"));
        assert!(store.has("<r3@x>"));
    }

    #[tokio::test]
    async fn untouched_groups_survive() {
        let (_dir, store, _) = open();
        post(&store, "<a@x>", "overchan.one");
        post(&store, "<b@x>", "overchan.two");

        let core = ExpirationCore::new(store.clone());
        core.expire_group("overchan.one", 0).unwrap();

        assert!(!store.has("<a@x>"));
        assert!(store.has("<b@x>"));
    }
}
