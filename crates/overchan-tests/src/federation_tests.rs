//! Outbound federation scenarios against scripted fake feeds.

use crate::generators::wire_article_lines;
use crate::harness::{FakeFeed, FakeFeedConn, TestPeer, TestRelay};
use overchan_daemon::{FeedSection, PolicyEntry};
use std::time::Duration;

fn feed_section(addr: std::net::SocketAddr, rules: &[(&str, bool)]) -> FeedSection {
    FeedSection {
        addr: addr.to_string(),
        name: "fakefeed".to_string(),
        proxy_type: String::new(),
        proxy_addr: String::new(),
        sync: false,
        policy: rules
            .iter()
            .map(|(pattern, allow)| PolicyEntry {
                pattern: pattern.to_string(),
                allow: *allow,
            })
            .collect(),
    }
}

/// Accept both persistent sessions and hand back (stream, reader).
async fn accept_both(feed: &FakeFeed) -> (FakeFeedConn, FakeFeedConn) {
    let first = feed.accept().await;
    let second = feed.accept().await;
    // give the dispatcher a beat to process both registrations
    tokio::time::sleep(Duration::from_millis(200)).await;
    if first.mode == "STREAM" {
        (first, second)
    } else {
        (second, first)
    }
}

/// Wait for a specific CHECK offer, skipping unrelated traffic.
async fn expect_check(conn: &mut FakeFeedConn, msgid: &str) {
    let expected = format!("CHECK {}", msgid);
    loop {
        let line = conn.read_line().await;
        if line == expected {
            return;
        }
    }
}

#[tokio::test]
async fn accept_and_federate() {
    let feed = FakeFeed::bind().await;
    let relay =
        TestRelay::start_with_feeds(vec![feed_section(feed.addr, &[("overchan.*", true)])]).await;
    let (mut stream_conn, _reader_conn) = accept_both(&feed).await;

    // peer A pushes an article inbound
    let mut peer_a = TestPeer::connect(relay.addr).await;
    peer_a.mode_stream().await;
    let lines = wire_article_lines("<fed@x>", "overchan.test", "foo", "federate me");
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer_a.takethis("<fed@x>", &refs).await, 239);

    // peer B (the fake feed) gets the offer
    expect_check(&mut stream_conn, "<fed@x>").await;
    stream_conn.send("238 <fed@x>").await;

    // then the article itself
    loop {
        let line = stream_conn.read_line().await;
        if line == "TAKETHIS <fed@x>" {
            break;
        }
    }
    let body = stream_conn.read_body().await;
    stream_conn.send("239 <fed@x>").await;

    // the relayed form leads with the local instance in Path
    let path_line = body
        .iter()
        .find(|l| l.starts_with("Path: "))
        .expect("path header");
    assert_eq!(path_line, "Path: relay.test!foo");
    assert!(body.iter().any(|l| l == "federate me"));
}

#[tokio::test]
async fn peer_with_article_is_not_resent() {
    let feed = FakeFeed::bind().await;
    let relay =
        TestRelay::start_with_feeds(vec![feed_section(feed.addr, &[("overchan.*", true)])]).await;
    let (mut stream_conn, _reader_conn) = accept_both(&feed).await;

    let mut peer_a = TestPeer::connect(relay.addr).await;
    peer_a.mode_stream().await;
    let lines = wire_article_lines("<have@x>", "overchan.test", "foo", "body");
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer_a.takethis("<have@x>", &refs).await, 239);

    expect_check(&mut stream_conn, "<have@x>").await;
    stream_conn.send("438 <have@x>").await;

    // no TAKETHIS follows a 438
    if let Some(line) = stream_conn.try_read_line(Duration::from_millis(500)).await {
        assert!(
            !line.starts_with("TAKETHIS <have@x>"),
            "article resent after 438: {}",
            line
        );
    }
}

#[tokio::test]
async fn policy_deny_skips_fanout() {
    let feed = FakeFeed::bind().await;
    // denies the private group, allows nothing else
    let relay = TestRelay::start_with_feeds(vec![feed_section(
        feed.addr,
        &[("overchan.private", false)],
    )])
    .await;
    let (mut stream_conn, _reader_conn) = accept_both(&feed).await;

    let mut peer_a = TestPeer::connect(relay.addr).await;
    peer_a.mode_stream().await;
    let lines = wire_article_lines("<priv@x>", "overchan.private", "foo", "secret");
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer_a.takethis("<priv@x>", &refs).await, 239);

    let store = relay.store.clone();
    assert!(relay.wait_until(move || store.has("<priv@x>")).await);

    // the denied feed hears nothing about it
    while let Some(line) = stream_conn.try_read_line(Duration::from_millis(500)).await {
        assert!(
            !line.contains("<priv@x>"),
            "denied group was offered: {}",
            line
        );
    }
}

#[tokio::test]
async fn missing_root_is_pulled_from_reader_peers() {
    let feed = FakeFeed::bind().await;
    let relay =
        TestRelay::start_with_feeds(vec![feed_section(feed.addr, &[("overchan.*", true)])]).await;
    let (_stream_conn, mut reader_conn) = accept_both(&feed).await;

    // a reply referencing a root we do not have
    let mut peer_a = TestPeer::connect(relay.addr).await;
    peer_a.mode_stream().await;
    let mut lines = wire_article_lines("<reply@x>", "overchan.test", "foo", "orphan reply");
    lines.insert(3, "References: <missingroot@x>".to_string());
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer_a.takethis("<reply@x>", &refs).await, 239);

    // the reader session is asked to pull the missing root
    loop {
        let line = reader_conn.read_line().await;
        if line == "ARTICLE <missingroot@x>" {
            break;
        }
    }
    reader_conn.send("430 <missingroot@x>").await;
}
