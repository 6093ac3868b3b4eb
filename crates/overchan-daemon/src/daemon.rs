//! The daemon: listener, outbound feed supervision, and the dispatcher
//! loop wiring inbound articles through store, index, expiration, and
//! fanout.

use crate::config::Config;
use crate::expire::{ExpirationCore, ExpireRequest};
use crate::frontend::{frontend_allows_group, frontend_channels, FrontendClient, FrontendLink};
use crate::moderation::ModerationQueue;
use anyhow::{Context, Result};
use overchan_index::{ArticleEntry, Database, MemoryIndex};
use overchan_nntp::{
    run_reader_feed, run_stream_feed, DispatcherHandle, FeedConfig, FeedMode, InboundSession,
    PeerHandle,
};
use overchan_store::ArticleStore;
use overchan_wire::{gen_message_id, valid_message_id, Article, CONTROL_GROUP};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Channel capacities, sized like the reference deployment.
const INFEED_CAP: usize = 8;
const INFEED_LOAD_CAP: usize = 4;
const FANOUT_CAP: usize = 16;
const ASK_CAP: usize = 16;
const PEER_TABLE_CAP: usize = 8;
const EXPIRE_CAP: usize = 8;

/// Rollover bound applied when the index has no page settings.
const FALLBACK_ROLLOVER: usize = 100;

/// Redial/cooldown delay for outbound feeds.
const FEED_RETRY_DELAY: Duration = Duration::from_secs(1);

/// The relay daemon.
pub struct Daemon {
    config: Config,
    store: ArticleStore,
    index: Arc<dyn Database>,
    moderation: ModerationQueue,
    frontend: Option<FrontendLink>,
    ask_tx: mpsc::Sender<ArticleEntry>,
    ask_rx: Option<mpsc::Receiver<ArticleEntry>>,
}

impl Daemon {
    /// Build a daemon with a fresh in-memory index.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_index(config, Arc::new(MemoryIndex::new()))
    }

    /// Build a daemon over an existing index.
    pub fn with_index(config: Config, index: Arc<dyn Database>) -> Result<Self> {
        let store = ArticleStore::open(config.store_config(), index.clone())
            .context("failed to open article store")?;
        let (ask_tx, ask_rx) = mpsc::channel(ASK_CAP);
        Ok(Self {
            config,
            store,
            index,
            moderation: ModerationQueue::new(),
            frontend: None,
            ask_tx,
            ask_rx: Some(ask_rx),
        })
    }

    /// Sender for pull-mode sync requests: entries queued here are asked
    /// of every reader peer whose policy admits the group.
    pub fn ask_for_article(&self) -> mpsc::Sender<ArticleEntry> {
        self.ask_tx.clone()
    }

    /// The article store.
    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    /// The article index.
    pub fn index(&self) -> &Arc<dyn Database> {
        &self.index
    }

    /// Attach a frontend, returning its client endpoints.
    pub fn attach_frontend(&mut self) -> FrontendClient {
        let (link, client) = frontend_channels();
        self.frontend = Some(link);
        client
    }

    /// Hand out the moderation event receiver (once).
    pub fn moderation_receiver(&mut self) -> Option<mpsc::Receiver<Article>> {
        self.moderation.take_receiver()
    }

    /// Bind the configured address and run.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.daemon.bind)
            .await
            .with_context(|| format!("failed to bind {}", self.config.daemon.bind))?;
        info!(addr = %listener.local_addr()?, "nntpd bound");
        self.run_on(listener).await
    }

    /// Run on an already-bound listener (tests bind `127.0.0.1:0`).
    pub async fn run_on(mut self, listener: TcpListener) -> Result<()> {
        let instance = self.config.daemon.instance_name.clone();

        let (infeed_tx, mut infeed_rx) = mpsc::channel::<Article>(INFEED_CAP);
        let (infeed_load_tx, mut infeed_load_rx) = mpsc::channel::<String>(INFEED_LOAD_CAP);
        let (fanout_tx, mut fanout_rx) = mpsc::channel::<ArticleEntry>(FANOUT_CAP);
        let mut ask_rx = self.ask_rx.take().context("daemon already ran")?;
        let (register_tx, mut register_rx) = mpsc::channel::<PeerHandle>(PEER_TABLE_CAP);
        let (deregister_tx, mut deregister_rx) = mpsc::channel::<String>(PEER_TABLE_CAP);
        let (expire_tx, expire_rx) = mpsc::channel::<ExpireRequest>(EXPIRE_CAP);

        let handle = DispatcherHandle {
            infeed_load: infeed_load_tx.clone(),
            register_peer: register_tx.clone(),
            deregister_peer: deregister_tx.clone(),
        };

        // admin key from config gets global moderation rights
        if !self.config.frontend.admin_key.is_empty() {
            info!(key = %self.config.frontend.admin_key, "registering admin key");
            self.index
                .mark_mod_pubkey_global(&self.config.frontend.admin_key)?;
        }

        // expiration loop
        tokio::spawn(ExpirationCore::new(self.store.clone()).run(expire_rx));

        // inbound accept loop
        tokio::spawn(accept_loop(
            listener,
            self.store.clone(),
            handle.clone(),
            instance.clone(),
        ));

        // two perpetual sessions per configured feed
        for feed in self.config.feed_configs()? {
            for mode in [FeedMode::Stream, FeedMode::Reader] {
                tokio::spawn(persist_feed(
                    feed.clone(),
                    mode,
                    self.store.clone(),
                    handle.clone(),
                ));
            }
        }

        // temp replay: everything still in incoming/ from a previous run
        {
            let incoming = self.store.incoming_dir().to_path_buf();
            let loader = infeed_load_tx.clone();
            tokio::spawn(async move {
                if let Ok(entries) = std::fs::read_dir(&incoming) {
                    for entry in entries.flatten() {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        debug!(msgid = %name, "replaying pending article");
                        if loader.send(name).await.is_err() {
                            break;
                        }
                    }
                }
            });
        }

        // welcome article on an empty index
        if self.index.article_count()? == 0 {
            let infeed = infeed_tx.clone();
            let instance = instance.clone();
            tokio::spawn(async move {
                let mut welcome = Article::plaintext(
                    "welcome to overchan, this post was inserted on startup automatically",
                    &format!("system@{}", instance),
                    "Welcome to Overchan",
                    "system",
                    &instance,
                    gen_message_id(&instance),
                    "overchan.test",
                );
                welcome.pack();
                let _ = infeed.send(welcome).await;
            });
        }

        // offer the whole inventory to every feed
        if self.config.daemon.sync_on_start {
            let entries = self.index.all_articles()?;
            let fanout = fanout_tx.clone();
            tokio::spawn(async move {
                info!(count = entries.len(), "sync on start");
                for entry in entries {
                    if fanout.send(entry).await.is_err() {
                        break;
                    }
                }
            });
        }

        // temp loader: parse temp files into full articles
        {
            let store = self.store.clone();
            let infeed = infeed_tx.clone();
            tokio::spawn(async move {
                while let Some(msgid) = infeed_load_rx.recv().await {
                    debug!(msgid = %msgid, "loading from infeed");
                    match store.read_temp(&msgid) {
                        Ok(article) => {
                            if infeed.send(article).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(msgid = %msgid, error = %e, "dropped malformed article"),
                    }
                }
            });
        }

        // frontend submissions enter the infeed directly, unsigned
        if let Some(link) = self.frontend.as_mut() {
            if let Some(mut from_frontend) = link.from_frontend.take() {
                let infeed = infeed_tx.clone();
                tokio::spawn(async move {
                    while let Some(article) = from_frontend.recv().await {
                        debug!(msgid = %article.message_id(), "frontend post");
                        if infeed.send(article).await.is_err() {
                            break;
                        }
                    }
                });
            }
        }

        // the dispatcher proper: single consumer over every channel
        let mod_tx = self.moderation.sender();
        let to_frontend = self.frontend.as_ref().map(|l| l.to_frontend.clone());
        let mut peers: HashMap<String, PeerHandle> = HashMap::new();

        loop {
            tokio::select! {
                Some(mut article) = infeed_rx.recv() => {
                    if let Err(e) = self.process_article(
                        &mut article,
                        &instance,
                        &peers,
                        &expire_tx,
                        &mod_tx,
                        to_frontend.as_ref(),
                    ).await {
                        warn!(msgid = %article.message_id(), error = %e, "ingest failed");
                    }
                }
                Some(peer) = register_rx.recv() => {
                    info!(peer = %peer.name, "outfeed registered");
                    if peer.sync_on_connect {
                        self.offer_inventory(&peer);
                    }
                    peers.insert(peer.name.clone(), peer);
                }
                Some(name) = deregister_rx.recv() => {
                    info!(peer = %name, "outfeed deregistered");
                    peers.remove(&name);
                }
                Some(entry) = fanout_rx.recv() => {
                    fanout_to_peers(&peers, &entry);
                }
                Some(entry) = ask_rx.recv() => {
                    ask_reader_peers(&peers, &entry);
                }
                else => break,
            }
        }
        Ok(())
    }

    /// The per-article pipeline (dispatcher step list).
    async fn process_article(
        &self,
        article: &mut Article,
        instance: &str,
        peers: &HashMap<String, PeerHandle>,
        expire_tx: &mpsc::Sender<ExpireRequest>,
        mod_tx: &mpsc::Sender<Article>,
        to_frontend: Option<&mpsc::Sender<Article>>,
    ) -> Result<()> {
        // one Path rewrite per hop; no-op when TAKETHIS already did it
        article.append_path(instance);

        let msgid = article.message_id().to_string();
        let group = article.newsgroup().to_string();
        info!(msgid = %msgid, group = %group, "ingesting article");

        if !self.config.daemon.allow_attachments && !article.attachments.is_empty() {
            article.attachments.clear();
            // the body shape changed, so the structural headers must too
            article
                .headers
                .set(overchan_wire::names::CONTENT_TYPE, "text/plain; charset=UTF-8");
        }
        if !self.config.daemon.allow_attachments {
            if let Some(inner) = article.signed_inner.as_mut() {
                // the envelope payload stays verbatim; this only stops
                // the store from persisting the decoded files
                inner.attachments.clear();
            }
        }

        self.store.store_post(article)?;

        // a reply to a root we lack: request it from reader peers
        let reference = article.signed().unwrap_or(article).reference().to_string();
        if !reference.is_empty()
            && valid_message_id(&reference)
            && !self.index.has_article(&reference)?
        {
            debug!(msgid = %msgid, root = %reference, "missing thread root");
            ask_reader_peers(peers, &ArticleEntry::new(reference, group.clone()));
        }

        // per-group rollover
        let rollover = match (
            self.index.threads_per_page(&group),
            self.index.pages_per_board(&group),
        ) {
            (Ok(tpp), Ok(ppb)) => (tpp as usize) * (ppb as usize),
            _ => FALLBACK_ROLLOVER,
        };
        let _ = expire_tx.send((group.clone(), rollover)).await;

        // moderation events ride the ctl group
        if group == CONTROL_GROUP {
            if mod_tx.try_send(article.clone()).is_err() {
                warn!(msgid = %msgid, "moderation queue full, event dropped");
            }
        }

        // federate outward
        fanout_to_peers(peers, &ArticleEntry::new(msgid.clone(), group.clone()));

        // and hand to the frontend when it wants the group
        if let Some(chan) = to_frontend {
            if frontend_allows_group(&group) {
                if chan.try_send(article.clone()).is_err() {
                    warn!(msgid = %msgid, "frontend queue full, delivery dropped");
                }
            } else {
                debug!(group = %group, "frontend does not take this group");
            }
        }

        Ok(())
    }

    /// Queue every known article entry toward one freshly-registered
    /// sync peer.
    fn offer_inventory(&self, peer: &PeerHandle) {
        let entries = match self.index.all_articles() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(peer = %peer.name, error = %e, "inventory listing failed");
                return;
            }
        };
        let tx = peer.tx.clone();
        let policy = peer.policy.clone();
        let name = peer.name.clone();
        tokio::spawn(async move {
            let mut offered = 0usize;
            for entry in entries {
                if !policy.allows_newsgroup(&entry.newsgroup) {
                    continue;
                }
                if tx.send(entry.msgid).await.is_err() {
                    break;
                }
                offered += 1;
            }
            info!(peer = %name, offered, "inventory sync queued");
        });
    }
}

/// Send a CHECK offer to every streaming peer whose policy admits the
/// group. Denied peers are skipped silently.
fn fanout_to_peers(peers: &HashMap<String, PeerHandle>, entry: &ArticleEntry) {
    debug!(msgid = %entry.msgid, "federating");
    for peer in peers.values() {
        if peer.mode != FeedMode::Stream || !peer.name.ends_with("-stream") {
            continue;
        }
        if !peer.policy.allows_newsgroup(&entry.newsgroup) {
            debug!(peer = %peer.name, group = %entry.newsgroup, "not allowed");
            continue;
        }
        if peer.tx.try_send(entry.msgid.clone()).is_err() {
            warn!(peer = %peer.name, msgid = %entry.msgid, "peer queue full, offer dropped");
        }
    }
}

/// Ask every reader peer whose policy admits the group to pull an
/// article.
fn ask_reader_peers(peers: &HashMap<String, PeerHandle>, entry: &ArticleEntry) {
    for peer in peers.values() {
        if peer.mode != FeedMode::Reader {
            continue;
        }
        if !peer.policy.allows_newsgroup(&entry.newsgroup) {
            continue;
        }
        debug!(peer = %peer.name, msgid = %entry.msgid, "asking for article");
        if peer.tx.try_send(entry.msgid.clone()).is_err() {
            warn!(peer = %peer.name, msgid = %entry.msgid, "peer queue full, ask dropped");
        }
    }
}

/// Accept inbound connections until the listener dies.
async fn accept_loop(
    listener: TcpListener,
    store: ArticleStore,
    handle: DispatcherHandle,
    instance: String,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let session =
                    InboundSession::new(stream, addr, store.clone(), handle.clone(), instance.clone());
                tokio::spawn(async move {
                    if let Err(e) = session.run().await {
                        debug!(peer = %addr, error = %e, "inbound session ended");
                    }
                });
            }
            Err(e) => {
                // the listener itself failed; nothing to accept anymore
                error!(error = %e, "accept failed, stopping listener");
                break;
            }
        }
    }
}

/// Keep one outbound session alive forever: dial, run, sleep, redial.
async fn persist_feed(
    feed: FeedConfig,
    mode: FeedMode,
    store: ArticleStore,
    handle: DispatcherHandle,
) {
    loop {
        let result = match mode {
            FeedMode::Stream => run_stream_feed(&feed, store.clone(), handle.clone()).await,
            FeedMode::Reader => run_reader_feed(&feed, store.clone(), handle.clone()).await,
        };
        match result {
            Ok(()) => info!(feed = %feed.name, mode = mode.suffix(), "feed disconnected"),
            Err(e) => debug!(feed = %feed.name, mode = mode.suffix(), error = %e, "feed failed"),
        }
        tokio::time::sleep(FEED_RETRY_DELAY).await;
    }
}
