//! Signed envelope scenarios.

use crate::generators::{
    article_lines, plain_article, signed_envelope, tampered_envelope, test_signing_key,
};
use crate::harness::{TestPeer, TestRelay};
use overchan_index::Database;
use overchan_wire::parse_article;

#[tokio::test]
async fn valid_envelope_records_pubkey() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    let inner = plain_article("<signed@x>", "overchan.test", "signed body");
    let (outer, pk) = signed_envelope(&inner, &test_signing_key(7));

    let lines = article_lines(&outer);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer.takethis("<signed@x>", &refs).await, 239);

    let index = relay.index.clone();
    assert!(relay
        .wait_until(move || index.has_article("<signed@x>").unwrap())
        .await);
    assert_eq!(relay.index.signed_pubkey("<signed@x>").unwrap(), Some(pk));

    // the stored envelope re-verifies from disk
    let stored = relay.store.read("<signed@x>").unwrap();
    assert!(stored.signed().is_some());
    assert_eq!(stored.signed().unwrap().body, "signed body");
}

#[tokio::test]
async fn tampered_envelope_is_stored_unsigned() {
    let relay = TestRelay::start().await;
    let mut peer = TestPeer::connect(relay.addr).await;
    peer.mode_stream().await;

    let inner = plain_article("<tampered@x>", "overchan.test", "signed body");
    let outer = tampered_envelope(&inner, &test_signing_key(7));

    let lines = article_lines(&outer);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    assert_eq!(peer.takethis("<tampered@x>", &refs).await, 239);

    // stored, but no signed view and no recorded author key
    let store = relay.store.clone();
    assert!(relay.wait_until(move || store.has("<tampered@x>")).await);
    let index = relay.index.clone();
    assert!(relay
        .wait_until(move || index.has_article("<tampered@x>").unwrap())
        .await);
    assert_eq!(relay.index.signed_pubkey("<tampered@x>").unwrap(), None);

    let stored = relay.store.read("<tampered@x>").unwrap();
    assert!(stored.signed().is_none());
    assert!(stored.signed_payload.is_some());
}

#[test]
fn envelope_roundtrips_through_parse() {
    let inner = plain_article("<env@x>", "overchan.test", "payload line\nsecond");
    let (outer, _) = signed_envelope(&inner, &test_signing_key(9));

    let bytes = overchan_wire::article_bytes(&outer, "\n");
    let parsed = parse_article(&bytes).unwrap();

    let view = parsed.signed().expect("signature should verify");
    assert_eq!(view.message_id(), "<env@x>");
    assert_eq!(view.body, "payload line\nsecond");
}
