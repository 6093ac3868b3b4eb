//! Builders for test articles and signed envelopes.

use ed25519_dalek::SigningKey;
use overchan_crypto::sign_payload;
use overchan_wire::{article_bytes, names, Article};

/// Build a minimal plaintext article.
pub fn plain_article(msgid: &str, group: &str, body: &str) -> Article {
    let mut a = Article::plaintext(
        body,
        "poster@example",
        "test subject",
        "poster",
        "origin.example",
        msgid.to_string(),
        group,
    );
    a.pack();
    a
}

/// Render an article as the unstuffed lines of a TAKETHIS body.
pub fn article_lines(article: &Article) -> Vec<String> {
    let raw = article_bytes(article, "\n");
    let text = String::from_utf8(raw).expect("utf8 article");
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if lines.last().map(String::as_str) == Some("") {
        lines.pop();
    }
    lines
}

/// Raw header+body lines for a tiny article with an explicit Path, the
/// shape an upstream relay would stream at us.
pub fn wire_article_lines(msgid: &str, group: &str, path: &str, body: &str) -> Vec<String> {
    vec![
        format!("Message-ID: {}", msgid),
        format!("Newsgroups: {}", group),
        format!("Path: {}", path),
        "From: poster <poster@example>".to_string(),
        "Subject: over the wire".to_string(),
        "Content-Type: text/plain; charset=UTF-8".to_string(),
        String::new(),
        body.to_string(),
    ]
}

/// Deterministic signing key for tests.
pub fn test_signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Wrap an article in a signed `message/rfc822` envelope sharing its
/// Message-ID. Returns the envelope plus the hex pubkey that signed it.
pub fn signed_envelope(inner: &Article, key: &SigningKey) -> (Article, String) {
    let payload = article_bytes(inner, "\n");
    let (pk, sig) = sign_payload(&payload, key).expect("serialized articles end with a newline");

    let mut outer = Article::default();
    outer
        .headers
        .add(names::MESSAGE_ID, inner.message_id().to_string());
    outer
        .headers
        .add(names::NEWSGROUPS, inner.newsgroup().to_string());
    outer
        .headers
        .add(names::PATH, "origin.example".to_string());
    outer.headers.add(names::CONTENT_TYPE, "message/rfc822");
    outer.headers.add(names::PUBKEY, pk.clone());
    outer.headers.add(names::SIGNATURE, sig);
    outer.signed_payload = Some(payload);
    (outer, pk)
}

/// Same envelope with one payload byte flipped after signing.
pub fn tampered_envelope(inner: &Article, key: &SigningKey) -> Article {
    let (mut outer, _) = signed_envelope(inner, key);
    let payload = outer.signed_payload.as_mut().expect("payload");
    payload[0] ^= 0x01;
    outer
}
