//! Test harness: an in-process relay plus scripted NNTP peers.

use futures::{SinkExt, StreamExt};
use overchan_daemon::{Config, Daemon, FeedSection};
use overchan_index::MemoryIndex;
use overchan_nntp::{parse_response, LineCodec};
use overchan_store::{ArticleStore, StoreConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

/// Instance name used by test relays.
pub const TEST_INSTANCE: &str = "relay.test";

/// A relay running inside the test process.
pub struct TestRelay {
    /// Store root (kept alive for the test's duration).
    pub dir: TempDir,
    /// The relay's index, concrete so tests can tweak group settings.
    pub index: Arc<MemoryIndex>,
    /// A second handle to the relay's store.
    pub store: ArticleStore,
    /// Address of the bound NNTP listener.
    pub addr: SocketAddr,
}

impl TestRelay {
    /// Start a relay with no outbound feeds.
    pub async fn start() -> Self {
        Self::start_with_feeds(Vec::new()).await
    }

    /// Start a relay with the given outbound feeds.
    pub async fn start_with_feeds(feeds: Vec<FeedSection>) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let index = Arc::new(MemoryIndex::new());

        let mut config = Config::default();
        config.daemon.instance_name = TEST_INSTANCE.to_string();
        config.store = store_section(dir.path());
        config.feeds = feeds;

        let store = ArticleStore::open(
            StoreConfig::under_root(dir.path()),
            index.clone() as Arc<dyn overchan_index::Database>,
        )
        .expect("open store");

        let daemon =
            Daemon::with_index(config, index.clone() as Arc<dyn overchan_index::Database>)
                .expect("daemon");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = daemon.run_on(listener).await;
        });

        Self {
            dir,
            index,
            store,
            addr,
        }
    }

    /// Poll until `predicate` holds or a 5 second deadline passes.
    pub async fn wait_until(&self, predicate: impl Fn() -> bool) -> bool {
        wait_until(predicate).await
    }
}

fn store_section(root: &std::path::Path) -> overchan_daemon::StoreSection {
    overchan_daemon::StoreSection {
        store_dir: root.join("store"),
        incoming_dir: root.join("incoming"),
        attachments_dir: root.join("attachments"),
        thumbs_dir: root.join("thumbs"),
        convert_bin: "/usr/bin/convert".into(),
        ffmpegthumbnailer_bin: "/usr/bin/ffmpeg".into(),
        sox_bin: "/usr/bin/sox".into(),
    }
}

/// Poll a predicate with a 5 second deadline.
pub async fn wait_until(predicate: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    predicate()
}

/// A scripted NNTP client driving an inbound session of the relay.
pub struct TestPeer {
    framed: Framed<TcpStream, LineCodec>,
}

impl TestPeer {
    /// Connect and consume the banner, asserting the 200 welcome.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let mut peer = Self {
            framed: Framed::new(stream, LineCodec),
        };
        let banner = peer.read_line().await;
        assert_eq!(response_code(&banner), 200, "banner: {}", banner);
        peer
    }

    /// Send one command line.
    pub async fn send(&mut self, line: &str) {
        self.framed.send(line.to_string()).await.expect("send");
    }

    /// Read one line, panicking on timeout or close.
    pub async fn read_line(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.framed.next())
            .await
            .expect("read timeout")
            .expect("connection closed")
            .expect("codec error")
    }

    /// Read lines until the dot terminator, returning the body lines.
    pub async fn read_body(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await;
            if line == "." {
                return lines;
            }
            lines.push(line);
        }
    }

    /// Negotiate streaming mode.
    pub async fn mode_stream(&mut self) {
        self.send("MODE STREAM").await;
        let reply = self.read_line().await;
        assert_eq!(response_code(&reply), 203, "MODE STREAM: {}", reply);
    }

    /// Negotiate reader mode.
    pub async fn mode_reader(&mut self) {
        self.send("MODE READER").await;
        let reply = self.read_line().await;
        assert_eq!(response_code(&reply), 201, "MODE READER: {}", reply);
    }

    /// CHECK an article, returning the response code.
    pub async fn check(&mut self, msgid: &str) -> u16 {
        self.send(&format!("CHECK {}", msgid)).await;
        response_code(&self.read_line().await)
    }

    /// TAKETHIS an article body (pre-rendered lines, unstuffed),
    /// returning the response code.
    pub async fn takethis(&mut self, msgid: &str, lines: &[&str]) -> u16 {
        self.send(&format!("TAKETHIS {}", msgid)).await;
        for line in lines {
            let stuffed = if line.starts_with('.') {
                format!(".{}", line)
            } else {
                line.to_string()
            };
            self.framed.feed(stuffed).await.expect("feed");
        }
        self.framed.send(".".to_string()).await.expect("terminator");
        response_code(&self.read_line().await)
    }
}

/// Extract the numeric code of a response line.
pub fn response_code(line: &str) -> u16 {
    parse_response(line).map(|(c, _)| c).unwrap_or(0)
}

/// A fake remote feed: accepts the relay's outbound connections and
/// performs the server side of the handshake.
pub struct FakeFeed {
    listener: TcpListener,
    /// Address to put into the relay's feed config.
    pub addr: SocketAddr,
}

/// One accepted connection, after handshake, tagged by the mode the
/// relay requested.
pub struct FakeFeedConn {
    /// `STREAM` or `READER`.
    pub mode: String,
    framed: Framed<TcpStream, LineCodec>,
}

impl FakeFeed {
    /// Bind the fake feed.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        Self { listener, addr }
    }

    /// Accept one connection and play the handshake: banner, capability
    /// block, and the MODE exchange.
    pub async fn accept(&self) -> FakeFeedConn {
        let (stream, _) = tokio::time::timeout(Duration::from_secs(10), self.listener.accept())
            .await
            .expect("accept timeout")
            .expect("accept");
        let mut framed = Framed::new(stream, LineCodec);

        framed
            .send("200 fake feed ready".to_string())
            .await
            .expect("banner");

        let mut mode = String::new();
        loop {
            let line = tokio::time::timeout(Duration::from_secs(10), framed.next())
                .await
                .expect("read timeout")
                .expect("closed")
                .expect("codec");
            let mut words = line.split_whitespace();
            match words.next().unwrap_or("") {
                "CAPABILITIES" => {
                    for cap in ["101 capability list", "VERSION 2", "STREAMING", "READER", "."] {
                        framed.send(cap.to_string()).await.expect("caps");
                    }
                }
                "MODE" => {
                    let requested = words.next().unwrap_or("").to_string();
                    let reply = if requested == "STREAM" {
                        "203 stream it"
                    } else {
                        "201 reader here"
                    };
                    framed.send(reply.to_string()).await.expect("mode reply");
                    mode = requested;
                    break;
                }
                "QUIT" => panic!("relay quit during handshake"),
                other => panic!("unexpected command in handshake: {}", other),
            }
        }

        FakeFeedConn { mode, framed }
    }
}

impl FakeFeedConn {
    /// Read one line from the relay.
    pub async fn read_line(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(5), self.framed.next())
            .await
            .expect("read timeout")
            .expect("closed")
            .expect("codec")
    }

    /// Try to read a line within `wait`; `None` on silence.
    pub async fn try_read_line(&mut self, wait: Duration) -> Option<String> {
        match tokio::time::timeout(wait, self.framed.next()).await {
            Ok(Some(Ok(line))) => Some(line),
            _ => None,
        }
    }

    /// Send one line to the relay.
    pub async fn send(&mut self, line: &str) {
        self.framed.send(line.to_string()).await.expect("send");
    }

    /// Read a dot-terminated body.
    pub async fn read_body(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await;
            if line == "." {
                return lines;
            }
            lines.push(line);
        }
    }
}
