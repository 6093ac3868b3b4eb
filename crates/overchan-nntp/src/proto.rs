//! Protocol constants, response parsing, and dot-stuffing.

/// Capability block advertised to peers.
pub const IMPLEMENTATION: &str = "overchan-relay";

/// Idle read timeout on inbound sessions.
pub const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5 * 60);

/// Response codes used by the relay.
pub mod code {
    /// Welcome, posting allowed.
    pub const WELCOME_POSTING: u16 = 200;
    /// Reader-mode welcome, posting disallowed.
    pub const WELCOME_NO_POSTING: u16 = 201;
    /// Streaming mode acknowledged.
    pub const STREAMING_OK: u16 = 203;
    /// Article follows.
    pub const ARTICLE_FOLLOWS: u16 = 220;
    /// Send the article (CHECK accepted).
    pub const WANT_ARTICLE: u16 = 238;
    /// Article transferred ok (TAKETHIS accepted).
    pub const ARTICLE_ACCEPTED: u16 = 239;
    /// No such article.
    pub const NO_SUCH_ARTICLE: u16 = 430;
    /// Do not send the article (already have it).
    pub const HAVE_ARTICLE: u16 = 438;
    /// Transfer rejected.
    pub const ARTICLE_REJECTED: u16 = 439;
    /// Syntax error.
    pub const SYNTAX_ERROR: u16 = 501;
}

/// Split a response line into its numeric code and the rest.
pub fn parse_response(line: &str) -> Option<(u16, &str)> {
    let (code, rest) = match line.split_once(' ') {
        Some((code, rest)) => (code, rest),
        None => (line, ""),
    };
    if code.len() != 3 {
        return None;
    }
    code.parse::<u16>().ok().map(|c| (c, rest))
}

/// Stuff one body line for transmission: a leading dot is doubled.
pub fn dot_stuff(line: &str) -> String {
    if line.starts_with('.') {
        format!(".{}", line)
    } else {
        line.to_string()
    }
}

/// Undo dot-stuffing on a received body line.
pub fn dot_unstuff(line: &str) -> &str {
    if line.starts_with("..") {
        &line[1..]
    } else {
        line
    }
}

/// Is this line the end-of-body terminator?
pub fn is_terminator(line: &str) -> bool {
    line == "."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing() {
        assert_eq!(parse_response("238 <a@b>"), Some((238, "<a@b>")));
        assert_eq!(parse_response("203 stream it"), Some((203, "stream it")));
        assert_eq!(parse_response("203"), Some((203, "")));
        assert_eq!(parse_response("nope"), None);
        assert_eq!(parse_response("20 x"), None);
    }

    #[test]
    fn stuffing_roundtrip() {
        for line in ["plain", ".leading", "..double", "", ". x"] {
            assert_eq!(dot_unstuff(&dot_stuff(line)), line);
        }
    }

    #[test]
    fn stuffed_forms() {
        assert_eq!(dot_stuff(".hidden"), "..hidden");
        assert_eq!(dot_stuff("visible"), "visible");
        assert_eq!(dot_unstuff("..hidden"), ".hidden");
        assert_eq!(dot_unstuff("visible"), "visible");
    }

    #[test]
    fn terminator() {
        assert!(is_terminator("."));
        assert!(!is_terminator(".."));
        assert!(!is_terminator(""));
    }
}
