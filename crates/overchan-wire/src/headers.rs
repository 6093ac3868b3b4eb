//! Ordered, case-insensitive header multimap.

/// Header names used across the relay.
pub mod names {
    pub const MESSAGE_ID: &str = "Message-ID";
    pub const NEWSGROUPS: &str = "Newsgroups";
    pub const REFERENCES: &str = "References";
    pub const PATH: &str = "Path";
    pub const FROM: &str = "From";
    pub const SUBJECT: &str = "Subject";
    pub const DATE: &str = "Date";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const CONTENT_TRANSFER_ENCODING: &str = "Content-Transfer-Encoding";
    pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
    pub const PUBKEY: &str = "X-PubKey-Ed25519";
    pub const SIGNATURE: &str = "X-Signature-Ed25519-Sha512";
}

/// An ordered multimap of article headers.
///
/// Insertion order is preserved for serialization; name lookup is
/// case-insensitive and returns the first value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values for the same name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Get the first value for a name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get the first value for a name, or a default.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    /// All values for a name, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace the first value for a name, or append if absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.into(),
            None => self.add(name.to_string(), value),
        }
    }

    /// Remove every value for a name.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Is a header present?
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no headers are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for Headers {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = Headers::new();
        h.add("Message-ID", "<a@b>");
        assert_eq!(h.get("message-id"), Some("<a@b>"));
        assert_eq!(h.get("MESSAGE-ID"), Some("<a@b>"));
    }

    #[test]
    fn first_value_wins() {
        let mut h = Headers::new();
        h.add("Path", "a!b");
        h.add("Path", "c!d");
        assert_eq!(h.get("Path"), Some("a!b"));
        assert_eq!(h.get_all("Path").count(), 2);
    }

    #[test]
    fn set_replaces_first() {
        let mut h = Headers::new();
        h.add("Subject", "old");
        h.set("subject", "new");
        assert_eq!(h.get("Subject"), Some("new"));
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn order_is_preserved() {
        let mut h = Headers::new();
        h.add("A", "1");
        h.add("B", "2");
        h.add("C", "3");
        let names: Vec<_> = h.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }
}
