//! The in-memory article graph.

use crate::attachment::Attachment;
use crate::headers::{names, Headers};
use overchan_crypto::sha512;

/// Newsgroup prefix exposed to the HTML frontend.
pub const FRONTEND_GROUP_PREFIX: &str = "overchan.";

/// Reserved newsgroup carrying moderation events.
pub const CONTROL_GROUP: &str = "ctl";

/// One news article: ordered headers, a plaintext body, attachments, and
/// optionally a verified inner article when the outer message is a signed
/// envelope.
///
/// The "signed view" is the projection [`Article::signed`], not a subtype:
/// consumers that index or render the article use the inner one when the
/// envelope verified, the outer one otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    /// Ordered header multimap.
    pub headers: Headers,
    /// Primary plaintext body.
    pub body: String,
    /// Decoded attachments, in part order.
    pub attachments: Vec<Attachment>,
    /// Inner article of a signed envelope that verified.
    pub signed_inner: Option<Box<Article>>,
    /// Verbatim canonical payload bytes of a signed envelope.
    pub signed_payload: Option<Vec<u8>>,
}

impl Article {
    /// Create an unsigned plaintext article with the standard header set.
    pub fn plaintext(
        message: &str,
        email: &str,
        subject: &str,
        name: &str,
        instance: &str,
        msgid: String,
        newsgroup: &str,
    ) -> Self {
        let mut headers = Headers::new();
        headers.add(names::MESSAGE_ID, msgid);
        headers.add(names::NEWSGROUPS, newsgroup.to_string());
        headers.add(names::FROM, format!("{} <{}>", name, email));
        headers.add(names::SUBJECT, subject.to_string());
        headers.add(names::PATH, instance.to_string());
        headers.add(names::DATE, chrono::Utc::now().to_rfc2822());
        headers.add(names::CONTENT_TYPE, "text/plain; charset=UTF-8");
        Self {
            headers,
            body: message.to_string(),
            ..Default::default()
        }
    }

    /// The article's Message-ID, or empty when absent.
    pub fn message_id(&self) -> &str {
        self.headers.get_or(names::MESSAGE_ID, "")
    }

    /// First newsgroup of the `Newsgroups` header.
    pub fn newsgroup(&self) -> &str {
        self.headers
            .get_or(names::NEWSGROUPS, "")
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
    }

    /// Thread root reference, or empty for a root post.
    pub fn reference(&self) -> &str {
        self.headers.get_or(names::REFERENCES, "").trim()
    }

    /// Raw Path header.
    pub fn path_header(&self) -> &str {
        self.headers.get_or(names::PATH, "")
    }

    /// Relay trail, leftmost hop first.
    pub fn path(&self) -> Vec<&str> {
        let raw = self.path_header();
        if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('!').collect()
        }
    }

    /// Hex pubkey header of a signed envelope.
    pub fn pubkey(&self) -> &str {
        self.headers.get_or(names::PUBKEY, "")
    }

    /// Hex signature header of a signed envelope.
    pub fn signature(&self) -> &str {
        self.headers.get_or(names::SIGNATURE, "")
    }

    /// Content-Type header, defaulting to plaintext.
    pub fn content_type(&self) -> &str {
        self.headers
            .get_or(names::CONTENT_TYPE, "text/plain; charset=UTF-8")
    }

    /// The verified signed view, when present.
    pub fn signed(&self) -> Option<&Article> {
        self.signed_inner.as_deref()
    }

    /// Prepend this relay to the Path trail.
    ///
    /// Idempotent at the hop boundary: when the leftmost element is
    /// already `instance`, nothing changes. The TAKETHIS ingest rewrites
    /// the raw header line and the dispatcher calls this again; only one
    /// of the two may take effect per hop.
    pub fn append_path(&mut self, instance: &str) {
        let current = self.path_header();
        if current.split('!').next() == Some(instance) {
            return;
        }
        let value = if current.is_empty() {
            instance.to_string()
        } else {
            format!("{}!{}", instance, current)
        };
        self.headers.set(names::PATH, value);
    }

    /// Normalize structural headers before serialization: set the Date if
    /// absent and make Content-Type match the article shape.
    pub fn pack(&mut self) {
        if !self.headers.contains(names::DATE) {
            self.headers.add(names::DATE, chrono::Utc::now().to_rfc2822());
        }
        if !self.attachments.is_empty() {
            let boundary = derive_boundary(self.message_id());
            self.headers.set(
                names::CONTENT_TYPE,
                format!("multipart/mixed; boundary=\"{}\"", boundary),
            );
        } else if self.signed_payload.is_some() {
            if !self.headers.contains(names::CONTENT_TYPE) {
                self.headers.add(names::CONTENT_TYPE, "message/rfc822");
            }
        } else if !self.headers.contains(names::CONTENT_TYPE) {
            self.headers
                .add(names::CONTENT_TYPE, "text/plain; charset=UTF-8");
        }
    }
}

/// Deterministic MIME boundary for an article, derived from its
/// Message-ID so serialization is reproducible.
pub fn derive_boundary(msgid: &str) -> String {
    let digest = sha512(msgid.as_bytes());
    format!("=_{}", hex::encode(&digest[..12]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_with_path(path: &str) -> Article {
        let mut a = Article::default();
        if !path.is_empty() {
            a.headers.add(names::PATH, path.to_string());
        }
        a
    }

    #[test]
    fn append_path_prepends() {
        let mut a = article_with_path("foo!bar");
        a.append_path("me.example");
        assert_eq!(a.path_header(), "me.example!foo!bar");
        assert_eq!(a.path(), vec!["me.example", "foo", "bar"]);
    }

    #[test]
    fn append_path_is_idempotent() {
        let mut a = article_with_path("me.example!foo");
        a.append_path("me.example");
        assert_eq!(a.path_header(), "me.example!foo");
    }

    #[test]
    fn append_path_on_empty() {
        let mut a = article_with_path("");
        a.append_path("me.example");
        assert_eq!(a.path_header(), "me.example");
    }

    #[test]
    fn newsgroup_takes_first() {
        let mut a = Article::default();
        a.headers
            .add(names::NEWSGROUPS, "overchan.test, overchan.other");
        assert_eq!(a.newsgroup(), "overchan.test");
    }

    #[test]
    fn plaintext_sets_standard_headers() {
        let a = Article::plaintext(
            "hello world",
            "system@me",
            "greetings",
            "system",
            "me.example",
            "<x@me.example>".to_string(),
            "overchan.test",
        );
        assert_eq!(a.message_id(), "<x@me.example>");
        assert_eq!(a.newsgroup(), "overchan.test");
        assert_eq!(a.path_header(), "me.example");
        assert_eq!(a.body, "hello world");
        assert!(a.headers.contains(names::DATE));
    }

    #[test]
    fn boundary_is_deterministic() {
        assert_eq!(derive_boundary("<a@b>"), derive_boundary("<a@b>"));
        assert_ne!(derive_boundary("<a@b>"), derive_boundary("<c@d>"));
    }
}
