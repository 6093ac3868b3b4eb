//! Inbound peer sessions.
//!
//! One session per accepted TCP connection. Starts in stream mode,
//! switches on `MODE`, and serves CHECK/TAKETHIS plus reader-mode
//! ARTICLE. Any I/O error or protocol violation ends the session.

use crate::body::{drain_body, read_line, receive_body_to_temp, send_body, NntpStream};
use crate::codec::LineCodec;
use crate::peer::DispatcherHandle;
use crate::proto::{code, IMPLEMENTATION};
use crate::NntpResult;
use futures::SinkExt;
use overchan_store::{ArticleStore, StoreError};
use overchan_wire::valid_message_id;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Sub-mode of an inbound session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionMode {
    Stream,
    Reader,
}

/// One accepted peer connection.
pub struct InboundSession {
    framed: NntpStream,
    store: ArticleStore,
    handle: DispatcherHandle,
    instance_name: String,
    peer: SocketAddr,
    mode: SessionMode,
}

impl InboundSession {
    /// Wrap an accepted connection.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        store: ArticleStore,
        handle: DispatcherHandle,
        instance_name: String,
    ) -> Self {
        Self {
            framed: Framed::new(stream, LineCodec),
            store,
            handle,
            instance_name,
            peer,
            mode: SessionMode::Stream,
        }
    }

    /// Drive the session until the peer disconnects or violates the
    /// protocol.
    pub async fn run(mut self) -> NntpResult<()> {
        info!(peer = %self.peer, "inbound connection");
        self.send(format!(
            "{} {} NNTP daemon ready",
            code::WELCOME_POSTING,
            IMPLEMENTATION
        ))
        .await?;

        loop {
            let line = match read_line(&mut self.framed).await {
                Ok(line) => line,
                Err(crate::NntpError::ConnectionClosed) => break,
                Err(e) => {
                    debug!(peer = %self.peer, error = %e, "inbound read failed");
                    return Err(e);
                }
            };

            let mut words = line.split_whitespace();
            let cmd = words.next().unwrap_or("").to_ascii_uppercase();
            let arg = words.next();

            match cmd.as_str() {
                "CAPABILITIES" => self.send_capabilities().await?,
                "MODE" => self.handle_mode(arg).await?,
                "QUIT" => break,
                "CHECK" if self.mode == SessionMode::Stream => {
                    self.handle_check(arg).await?;
                }
                "TAKETHIS" if self.mode == SessionMode::Stream => {
                    self.handle_takethis(arg).await?;
                }
                "ARTICLE" if self.mode == SessionMode::Reader => {
                    self.handle_article(arg).await?;
                }
                "" => {}
                _ => {
                    self.send(format!("{} unknown command", code::SYNTAX_ERROR))
                        .await?;
                }
            }
        }

        info!(peer = %self.peer, "inbound connection closed");
        Ok(())
    }

    async fn send(&mut self, line: String) -> NntpResult<()> {
        self.framed.send(line).await
    }

    async fn send_capabilities(&mut self) -> NntpResult<()> {
        self.framed.feed("101 capability list".to_string()).await?;
        self.framed.feed("VERSION 2".to_string()).await?;
        self.framed
            .feed(format!("IMPLEMENTATION {}", IMPLEMENTATION))
            .await?;
        self.framed.feed("STREAMING".to_string()).await?;
        self.framed.feed("READER".to_string()).await?;
        self.framed.send(".".to_string()).await?;
        Ok(())
    }

    async fn handle_mode(&mut self, arg: Option<&str>) -> NntpResult<()> {
        match arg.map(|m| m.to_ascii_uppercase()).as_deref() {
            Some("READER") => {
                self.mode = SessionMode::Reader;
                self.send(format!("{} posting disallowed", code::WELCOME_NO_POSTING))
                    .await
            }
            Some("STREAM") => {
                self.mode = SessionMode::Stream;
                self.send(format!("{} stream it", code::STREAMING_OK)).await
            }
            Some(_) => {
                self.send(format!("{} mode not implemented", code::SYNTAX_ERROR))
                    .await
            }
            None => {
                self.send(format!("{} syntax error", code::SYNTAX_ERROR))
                    .await
            }
        }
    }

    async fn handle_check(&mut self, arg: Option<&str>) -> NntpResult<()> {
        let Some(msgid) = arg.filter(|id| valid_message_id(id)) else {
            return self
                .send(format!("{} bad message id", code::SYNTAX_ERROR))
                .await;
        };
        if self.store.has(msgid) {
            self.send(format!("{} {} we have this article", code::HAVE_ARTICLE, msgid))
                .await
        } else {
            self.send(format!("{} {} send it please", code::WANT_ARTICLE, msgid))
                .await
        }
    }

    async fn handle_takethis(&mut self, arg: Option<&str>) -> NntpResult<()> {
        let Some(msgid) = arg.filter(|id| valid_message_id(id)) else {
            // consume the body to stay in sync, then reject
            drain_body(&mut self.framed).await?;
            return self
                .send(format!("{} bad message id", code::SYNTAX_ERROR))
                .await;
        };
        let msgid = msgid.to_string();

        let stored = receive_body_to_temp(
            &mut self.framed,
            &self.store,
            &msgid,
            Some(self.instance_name.as_str()),
        )
        .await?;

        self.send(format!("{} {}", code::ARTICLE_ACCEPTED, msgid))
            .await?;

        if stored {
            info!(peer = %self.peer, msgid = %msgid, "received article");
            if self.handle.infeed_load.send(msgid.clone()).await.is_err() {
                warn!(msgid = %msgid, "dispatcher gone, article left in incoming");
            }
        } else {
            debug!(peer = %self.peer, msgid = %msgid, "duplicate in-flight article discarded");
        }
        Ok(())
    }

    async fn handle_article(&mut self, arg: Option<&str>) -> NntpResult<()> {
        let Some(msgid) = arg.filter(|id| valid_message_id(id)) else {
            return self
                .send(format!("{} bad message id", code::SYNTAX_ERROR))
                .await;
        };
        match self.store.read_raw(msgid) {
            Ok(raw) => {
                self.send(format!("{} {} article", code::ARTICLE_FOLLOWS, msgid))
                    .await?;
                send_body(&mut self.framed, &raw).await
            }
            Err(StoreError::NotFound(_)) | Err(StoreError::InvalidMessageId(_)) => {
                self.send(format!("{} {}", code::NO_SUCH_ARTICLE, msgid))
                    .await
            }
            Err(e) => Err(e.into()),
        }
    }
}
