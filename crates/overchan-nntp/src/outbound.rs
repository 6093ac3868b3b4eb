//! Outbound peer sessions.
//!
//! Each configured feed runs one streaming session (push via
//! CHECK/TAKETHIS) and one reader session (pull via ARTICLE). A runner
//! drives a single connection lifecycle; the daemon's supervisor redials
//! on exit.

use crate::body::{read_line, receive_body_to_temp, send_body, NntpStream};
use crate::codec::LineCodec;
use crate::dial::{dial, ProxyConfig};
use crate::peer::{DispatcherHandle, FeedMode, PeerHandle};
use crate::policy::FeedPolicy;
use crate::proto::{code, parse_response};
use crate::{NntpError, NntpResult};
use futures::{SinkExt, StreamExt};
use overchan_store::{ArticleStore, StoreError};
use overchan_wire::valid_message_id;
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Capacity of a peer's offer channel.
const PEER_CHANNEL_CAP: usize = 64;

/// Static configuration of one outbound feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Feed name (peer names add the mode suffix).
    pub name: String,
    /// Remote `host:port`.
    pub addr: String,
    /// Proxy to dial through.
    pub proxy: ProxyConfig,
    /// Newsgroups this feed receives.
    pub policy: FeedPolicy,
    /// One-shot pull sync at startup.
    pub sync: bool,
}

/// What the peer told us during the handshake.
#[derive(Debug, Clone, Copy, Default)]
struct PeerCaps {
    posting: bool,
    streaming: bool,
    reader: bool,
}

/// Read the banner and capability block.
async fn outbound_handshake(framed: &mut NntpStream) -> NntpResult<PeerCaps> {
    let banner = read_line(framed).await?;
    let (banner_code, _) = parse_response(&banner)
        .ok_or_else(|| NntpError::Handshake(format!("bad banner: {}", banner)))?;
    let mut caps = PeerCaps {
        posting: banner_code == code::WELCOME_POSTING,
        ..Default::default()
    };
    if banner_code != code::WELCOME_POSTING && banner_code != code::WELCOME_NO_POSTING {
        return Err(NntpError::Handshake(format!("unexpected banner: {}", banner)));
    }

    framed.send("CAPABILITIES".to_string()).await?;
    let first = read_line(framed).await?;
    match parse_response(&first) {
        Some((101, _)) => loop {
            let line = read_line(framed).await?;
            if line == "." {
                break;
            }
            match line.to_ascii_lowercase().as_str() {
                "streaming" | "postihavestreaming" => caps.streaming = true,
                "reader" => caps.reader = true,
                _ => {}
            }
        },
        _ => debug!(line = %first, "peer has no capability block"),
    }
    Ok(caps)
}

/// Run one streaming connection against a feed.
///
/// Dial, handshake, `MODE STREAM`, then the offer loop: Message-IDs from
/// the dispatcher become CHECKs, `238` responses queue a TAKETHIS, and
/// everything else is bookkeeping. Path is never rewritten here.
pub async fn run_stream_feed(
    feed: &FeedConfig,
    store: ArticleStore,
    handle: DispatcherHandle,
) -> NntpResult<()> {
    let stream = dial(&feed.proxy, &feed.addr).await?;
    let mut framed = Framed::new(stream, LineCodec);

    let caps = outbound_handshake(&mut framed).await?;
    if !caps.posting || !caps.streaming {
        let _ = framed.send("QUIT".to_string()).await;
        return Err(NntpError::Handshake(format!(
            "feed does not stream (posting={}, streaming={})",
            caps.posting, caps.streaming
        )));
    }

    framed.send("MODE STREAM".to_string()).await?;
    let line = read_line(&mut framed).await?;
    match parse_response(&line) {
        Some((c, _)) if c == code::STREAMING_OK => {}
        Some((c, rest)) => {
            return Err(NntpError::BadResponse {
                code: c,
                line: rest.to_string(),
            })
        }
        None => return Err(NntpError::Protocol(format!("bad response: {}", line))),
    }
    info!(feed = %feed.name, "streaming mode activated");

    let (tx, mut rx) = mpsc::channel(PEER_CHANNEL_CAP);
    let name = format!("{}-{}", feed.name, FeedMode::Stream.suffix());
    register(&handle, &name, feed, FeedMode::Stream, tx).await?;

    let result = stream_loop(&mut framed, &mut rx, &store, &name).await;
    let _ = handle.deregister_peer.send(name).await;
    result
}

async fn register(
    handle: &DispatcherHandle,
    name: &str,
    feed: &FeedConfig,
    mode: FeedMode,
    tx: mpsc::Sender<String>,
) -> NntpResult<()> {
    handle
        .register_peer
        .send(PeerHandle {
            name: name.to_string(),
            policy: feed.policy.clone(),
            mode,
            sync_on_connect: feed.sync && mode == FeedMode::Stream,
            tx,
        })
        .await
        .map_err(|_| NntpError::Protocol("dispatcher gone".to_string()))
}

/// The streaming mainloop for one connection.
async fn stream_loop(
    framed: &mut NntpStream,
    rx: &mut mpsc::Receiver<String>,
    store: &ArticleStore,
    name: &str,
) -> NntpResult<()> {
    let mut pending: VecDeque<String> = VecDeque::new();

    loop {
        // queued TAKETHIS sends take priority over new offers
        if let Some(msgid) = pending.pop_front() {
            send_takethis(framed, store, &msgid, name).await?;
            continue;
        }

        tokio::select! {
            offer = rx.recv() => match offer {
                Some(msgid) => {
                    debug!(feed = %name, msgid = %msgid, "offering article");
                    framed.send(format!("CHECK {}", msgid)).await?;
                }
                None => return Ok(()),
            },
            reply = framed.next() => {
                let line = reply.ok_or(NntpError::ConnectionClosed)??;
                handle_stream_reply(&line, &mut pending, name);
            }
        }
    }
}

/// Interpret one streaming-mode response line.
fn handle_stream_reply(line: &str, pending: &mut VecDeque<String>, name: &str) {
    match parse_response(line) {
        Some((c, rest)) if c == code::WANT_ARTICLE => {
            let msgid = rest.split_whitespace().next().unwrap_or("");
            if valid_message_id(msgid) {
                pending.push_back(msgid.to_string());
            } else {
                warn!(feed = %name, line = %line, "238 with bad message id");
            }
        }
        Some((c, _)) if c == code::HAVE_ARTICLE => {}
        Some((c, _)) if c == code::ARTICLE_ACCEPTED => {}
        Some((c, rest)) if (400..600).contains(&c) => {
            warn!(feed = %name, code = c, line = %rest, "feed refused");
        }
        _ => warn!(feed = %name, line = %line, "invalid response from feed"),
    }
}

/// Send one article as TAKETHIS with a dot-stuffed body.
async fn send_takethis(
    framed: &mut NntpStream,
    store: &ArticleStore,
    msgid: &str,
    name: &str,
) -> NntpResult<()> {
    let raw = match store.read_raw(msgid) {
        Ok(raw) => raw,
        Err(StoreError::NotFound(_)) => {
            warn!(feed = %name, msgid = %msgid, "article vanished before send");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    debug!(feed = %name, msgid = %msgid, "sending article");
    framed.send(format!("TAKETHIS {}", msgid)).await?;
    send_body(framed, &raw).await
}

/// Run one reader (pull) connection against a feed.
///
/// Message-IDs from the dispatcher that we do not store yet become
/// ARTICLE requests; received bodies land in the temp store and are
/// queued for ingestion like any inbound article.
pub async fn run_reader_feed(
    feed: &FeedConfig,
    store: ArticleStore,
    handle: DispatcherHandle,
) -> NntpResult<()> {
    let stream = dial(&feed.proxy, &feed.addr).await?;
    let mut framed = Framed::new(stream, LineCodec);

    let caps = outbound_handshake(&mut framed).await?;
    if !caps.reader {
        let _ = framed.send("QUIT".to_string()).await;
        return Err(NntpError::Handshake("feed has no reader mode".to_string()));
    }

    framed.send("MODE READER".to_string()).await?;
    let line = read_line(&mut framed).await?;
    match parse_response(&line) {
        Some((c, _)) if c == code::WELCOME_POSTING || c == code::WELCOME_NO_POSTING => {}
        _ => return Err(NntpError::Protocol(format!("bad MODE READER reply: {}", line))),
    }

    let (tx, mut rx) = mpsc::channel(PEER_CHANNEL_CAP);
    let name = format!("{}-{}", feed.name, FeedMode::Reader.suffix());
    register(&handle, &name, feed, FeedMode::Reader, tx).await?;

    let result = reader_loop(&mut framed, &mut rx, &store, &handle, &name).await;
    let _ = handle.deregister_peer.send(name).await;
    result
}

/// The reader mainloop: request and ingest articles one at a time.
async fn reader_loop(
    framed: &mut NntpStream,
    rx: &mut mpsc::Receiver<String>,
    store: &ArticleStore,
    handle: &DispatcherHandle,
    name: &str,
) -> NntpResult<()> {
    while let Some(msgid) = rx.recv().await {
        if store.has(&msgid) {
            continue;
        }
        if let Err(e) = pull_article(framed, store, handle, name, &msgid).await {
            match e {
                NntpError::Store(inner) => {
                    // local trouble with this article only
                    warn!(feed = %name, msgid = %msgid, error = %inner, "pull failed");
                }
                other => return Err(other),
            }
        }
    }
    Ok(())
}

async fn pull_article(
    framed: &mut NntpStream,
    store: &ArticleStore,
    handle: &DispatcherHandle,
    name: &str,
    msgid: &str,
) -> NntpResult<()> {
    framed.send(format!("ARTICLE {}", msgid)).await?;
    let line = read_line(framed).await?;
    match parse_response(&line) {
        Some((c, _)) if c == code::ARTICLE_FOLLOWS => {
            // no Path rewrite on pull; the dispatcher prepends us on ingest
            let stored = receive_body_to_temp(framed, store, msgid, None).await?;
            if stored {
                info!(feed = %name, msgid = %msgid, "pulled article");
                let _ = handle.infeed_load.send(msgid.to_string()).await;
            }
            Ok(())
        }
        Some((c, _)) if c == code::NO_SUCH_ARTICLE => {
            debug!(feed = %name, msgid = %msgid, "feed lacks article");
            Ok(())
        }
        Some((c, rest)) => {
            warn!(feed = %name, code = c, line = %rest, "unexpected ARTICLE reply");
            Ok(())
        }
        None => Err(NntpError::Protocol(format!("bad response: {}", line))),
    }
}
