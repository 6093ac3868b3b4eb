//! Per-group rollover end to end.

use crate::generators::wire_article_lines;
use crate::harness::{TestPeer, TestRelay};
use overchan_index::Database;

#[tokio::test]
async fn oldest_thread_rolls_over() {
    let relay = TestRelay::start().await;
    // 2 threads per page, 2 pages per board: the group holds 4 threads
    relay.index.set_group_pages("overchan.test", 2, 2);

    // let the startup welcome article land first so thread ordering in
    // the group is deterministic
    let index = relay.index.clone();
    assert!(relay
        .wait_until(move || index.article_count().unwrap() >= 1)
        .await);

    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    for i in 1..=5 {
        let msgid = format!("<r{}@x>", i);
        let lines = wire_article_lines(&msgid, "overchan.test", "foo", "root post");
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        assert_eq!(peer.takethis(&msgid, &refs).await, 239);

        let store = relay.store.clone();
        let wanted = msgid.clone();
        assert!(relay.wait_until(move || store.has(&wanted)).await);
    }

    // r1 (and the older welcome thread) fall off the board
    let store = relay.store.clone();
    assert!(relay.wait_until(move || !store.has("<r1@x>")).await);
    let index = relay.index.clone();
    assert!(relay
        .wait_until(move || !index.has_article("<r1@x>").unwrap())
        .await);

    for i in 2..=5 {
        let msgid = format!("<r{}@x>", i);
        assert!(relay.store.has(&msgid), "{} should survive rollover", msgid);
        assert!(relay.index.has_article(&msgid).unwrap());
    }
}

#[tokio::test]
async fn groups_without_settings_use_fallback() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    // far below the fallback bound of 100 threads, nothing expires
    for i in 1..=5 {
        let msgid = format!("<k{}@x>", i);
        let lines = wire_article_lines(&msgid, "overchan.keep", "foo", "kept");
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        assert_eq!(peer.takethis(&msgid, &refs).await, 239);
    }

    let store = relay.store.clone();
    assert!(relay.wait_until(move || store.has("<k5@x>")).await);
    for i in 1..=5 {
        assert!(relay.store.has(&format!("<k{}@x>", i)));
    }
}
