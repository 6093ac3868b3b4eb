//! Inbound session scenarios over real TCP.

use crate::generators::{article_lines, plain_article, wire_article_lines};
use crate::harness::{response_code, TestPeer, TestRelay, TEST_INSTANCE};
use overchan_index::Database;

#[tokio::test]
async fn capabilities_block() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;

    peer.send("CAPABILITIES").await;
    let first = peer.read_line().await;
    assert_eq!(response_code(&first), 101);
    let caps = peer.read_body().await;
    assert!(caps.iter().any(|l| l == "VERSION 2"));
    assert!(caps.iter().any(|l| l == "STREAMING"));
    assert!(caps.iter().any(|l| l == "READER"));
}

#[tokio::test]
async fn accept_rewrites_path_once() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    let lines = wire_article_lines("<m@x>", "overchan.test", "foo", "hello relay");
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer.takethis("<m@x>", &refs).await, 239);

    let store = relay.store.clone();
    assert!(relay.wait_until(move || store.has("<m@x>")).await);

    let article = relay.store.read("<m@x>").unwrap();
    assert_eq!(article.path_header(), format!("{}!foo", TEST_INSTANCE));
    assert_eq!(article.body, "hello relay");

    let index = relay.index.clone();
    assert!(relay
        .wait_until(move || index.has_article("<m@x>").unwrap())
        .await);
}

#[tokio::test]
async fn check_reflects_store_state() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    assert_eq!(peer.check("<fresh@x>").await, 238);

    let lines = wire_article_lines("<fresh@x>", "overchan.test", "foo", "body");
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer.takethis("<fresh@x>", &refs).await, 239);

    let store = relay.store.clone();
    assert!(relay.wait_until(move || store.has("<fresh@x>")).await);
    assert_eq!(peer.check("<fresh@x>").await, 438);
}

#[tokio::test]
async fn replayed_takethis_keeps_one_copy() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    let lines = wire_article_lines("<dup@x>", "overchan.test", "foo", "body");
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();

    assert_eq!(peer.takethis("<dup@x>", &refs).await, 239);
    // replayed immediately: either refused at the temp lock or accepted
    // and re-ingested idempotently
    assert_eq!(peer.takethis("<dup@x>", &refs).await, 239);

    let store = relay.store.clone();
    assert!(relay.wait_until(move || store.has("<dup@x>")).await);
    let article = relay.store.read("<dup@x>").unwrap();
    // the path gained exactly one hop
    assert_eq!(article.path_header(), format!("{}!foo", TEST_INSTANCE));
}

#[tokio::test]
async fn invalid_ids_get_501_and_no_state() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    assert_eq!(peer.check("<../../etc/passwd@x>").await, 501);
    assert_eq!(peer.check("not-an-id").await, 501);

    // TAKETHIS with a bad id consumes the body and rejects
    assert_eq!(
        peer.takethis("<bad/id@x>", &["Message-ID: <bad/id@x>", "", "body"])
            .await,
        501
    );
    // session is still in sync afterwards
    assert_eq!(peer.check("<ok@x>").await, 238);
}

#[tokio::test]
async fn reader_mode_serves_articles() {
    let relay = TestRelay::start().await;

    // feed an article in via streaming
    let mut pusher = TestPeer::connect(relay.addr).await;
    pusher.mode_stream().await;
    let article = plain_article("<served@x>", "overchan.test", "line one\n.leading dot");
    let lines = article_lines(&article);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(pusher.takethis("<served@x>", &refs).await, 239);
    let store = relay.store.clone();
    assert!(relay.wait_until(move || store.has("<served@x>")).await);

    // pull it back in reader mode
    let mut reader = TestPeer::connect(relay.addr).await;
    reader.mode_reader().await;

    reader.send("ARTICLE <served@x>").await;
    let status = reader.read_line().await;
    assert_eq!(response_code(&status), 220);
    let body = reader.read_body().await;
    assert!(body.iter().any(|l| l == "..leading dot"), "body: {:?}", body);
    assert!(body.iter().any(|l| l.starts_with("Message-ID: <served@x>")));

    reader.send("ARTICLE <absent@x>").await;
    assert_eq!(response_code(&reader.read_line().await), 430);

    reader.send("ARTICLE garbage").await;
    assert_eq!(response_code(&reader.read_line().await), 501);
}

#[tokio::test]
async fn mode_switching() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;

    peer.mode_reader().await;
    // stream commands are unknown in reader mode
    peer.send("CHECK <x@y>").await;
    assert_eq!(response_code(&peer.read_line().await), 501);

    peer.mode_stream().await;
    assert_eq!(peer.check("<x@y>").await, 238);

    peer.send("MODE BOGUS").await;
    assert_eq!(response_code(&peer.read_line().await), 501);
}
