//! Article parsing: RFC 5322 headers plus the three MIME body shapes
//! (multipart, signed envelope, singular).

use crate::article::Article;
use crate::attachment::Attachment;
use crate::error::{WireError, WireResult};
use crate::headers::{names, Headers};
use base64::Engine;
use overchan_crypto::CryptoError;
use std::collections::HashMap;
use std::io::Read;
use tracing::{debug, warn};

/// Parse an article from a reader. The whole message is buffered; article
/// size is bounded upstream by the session layer.
pub fn read_article<R: Read>(mut r: R) -> WireResult<Article> {
    let mut data = Vec::new();
    r.read_to_end(&mut data)?;
    parse_article(&data)
}

/// Parse an article from raw bytes.
pub fn parse_article(data: &[u8]) -> WireResult<Article> {
    let (headers, body) = split_header_block(data)?;

    let mut article = Article {
        headers,
        ..Default::default()
    };

    let (media_type, params) = parse_media_type(article.content_type())?;

    if let Some(boundary) = params.get("boundary") {
        parse_multipart(&mut article, body, boundary)?;
    } else if media_type == "message/rfc822" {
        parse_signed_envelope(&mut article, body)?;
    } else if media_type.starts_with("text/") {
        article.body = text_body(body);
    } else {
        // opaque singular type becomes a single attachment
        let filename = params
            .get("name")
            .or_else(|| params.get("filename"))
            .cloned()
            .unwrap_or_default();
        article
            .attachments
            .push(Attachment::new(filename, media_type, body.to_vec()));
    }

    Ok(article)
}

/// Split the RFC 5322 header block from the body, unfolding continuation
/// lines. Accepts both `\r\n` and `\n` line endings.
fn split_header_block(data: &[u8]) -> WireResult<(Headers, &[u8])> {
    let mut headers = Headers::new();
    let mut pos = 0usize;
    let mut current: Option<(String, String)> = None;

    loop {
        let (line, next) = next_line(data, pos);
        pos = next;

        if line.is_empty() {
            // blank line ends the block; a message with no body is fine
            break;
        }

        let line = String::from_utf8_lossy(line);
        if line.starts_with(' ') || line.starts_with('\t') {
            // folded continuation of the previous header
            match current.as_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                None => {
                    return Err(WireError::MalformedHeader(
                        "continuation line before any header".into(),
                    ))
                }
            }
            continue;
        }

        if let Some((name, value)) = current.take() {
            headers.add(name, value);
        }

        match line.split_once(':') {
            Some((name, value)) => {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
            None => {
                return Err(WireError::MalformedHeader(format!(
                    "header line without colon: {:?}",
                    line
                )))
            }
        }

        if pos >= data.len() {
            break;
        }
    }

    if let Some((name, value)) = current.take() {
        headers.add(name, value);
    }

    Ok((headers, &data[pos.min(data.len())..]))
}

/// Body text with line endings normalized to `\n` and the final newline
/// dropped.
fn text_body(body: &[u8]) -> String {
    let mut out = String::new();
    let mut pos = 0usize;
    let mut first = true;
    while pos < body.len() {
        let (line, next) = next_line(body, pos);
        if !first {
            out.push('\n');
        }
        first = false;
        out.push_str(&String::from_utf8_lossy(line));
        pos = next;
    }
    out
}

/// Next line starting at `pos`, without its terminator, plus the offset of
/// the following line.
fn next_line(data: &[u8], pos: usize) -> (&[u8], usize) {
    let rest = &data[pos..];
    match rest.iter().position(|&b| b == b'\n') {
        Some(idx) => {
            let mut line = &rest[..idx];
            if line.ends_with(b"\r") {
                line = &line[..line.len() - 1];
            }
            (line, pos + idx + 1)
        }
        None => (rest, data.len()),
    }
}

/// Parse a `Content-Type`-style value into a lowercased media type and its
/// parameters.
pub fn parse_media_type(value: &str) -> WireResult<(String, HashMap<String, String>)> {
    let mut parts = value.split(';');
    let media_type = parts
        .next()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| WireError::InvalidMediaType(value.to_string()))?;

    let mut params = HashMap::new();
    for part in parts {
        if let Some((key, val)) = part.split_once('=') {
            let val = val.trim().trim_matches('"');
            params.insert(key.trim().to_ascii_lowercase(), val.to_string());
        }
    }
    Ok((media_type, params))
}

/// Iterate MIME parts: the first `text/plain` part becomes the body, every
/// other part an attachment.
fn parse_multipart(article: &mut Article, body: &[u8], boundary: &str) -> WireResult<()> {
    let open = format!("--{}", boundary);
    let close = format!("--{}--", boundary);

    let mut pos = 0usize;

    // skip preamble
    loop {
        if pos >= body.len() {
            return Err(WireError::InvalidMultipart("missing opening boundary".into()));
        }
        let (line, next) = next_line(body, pos);
        pos = next;
        let line = String::from_utf8_lossy(line);
        if line == close {
            return Ok(());
        }
        if line == open {
            break;
        }
    }

    let mut have_body = false;
    loop {
        let (part_headers, consumed) = part_header_block(&body[pos..])?;
        pos += consumed;

        // collect part content until the next boundary line
        let mut content: Vec<u8> = Vec::new();
        let mut first_line = true;
        let mut closed = false;
        let mut terminated = false;
        while pos < body.len() {
            let (line, next) = next_line(body, pos);
            let text = String::from_utf8_lossy(line);
            if text == open || text == close {
                closed = text == close;
                pos = next;
                terminated = true;
                break;
            }
            if !first_line {
                content.push(b'\n');
            }
            first_line = false;
            content.extend_from_slice(line);
            pos = next;
        }
        if !terminated {
            return Err(WireError::InvalidMultipart("unterminated part".into()));
        }

        attach_part(article, &part_headers, &content, &mut have_body)?;

        if closed {
            return Ok(());
        }
    }
}

/// Header block of a MIME part; returns headers plus bytes consumed.
fn part_header_block(data: &[u8]) -> WireResult<(Headers, usize)> {
    let (headers, rest) = split_header_block(data)?;
    Ok((headers, data.len() - rest.len()))
}

/// Decode one MIME part into the article body or an attachment.
fn attach_part(
    article: &mut Article,
    part_headers: &Headers,
    content: &[u8],
    have_body: &mut bool,
) -> WireResult<()> {
    let ctype = part_headers.get_or(names::CONTENT_TYPE, "text/plain; charset=UTF-8");
    let (media_type, params) = parse_media_type(ctype)?;

    let encoding = part_headers
        .get_or(names::CONTENT_TRANSFER_ENCODING, "")
        .trim()
        .to_ascii_lowercase();
    let decoded = if encoding == "base64" {
        decode_base64_body(content)?
    } else {
        content.to_vec()
    };

    if media_type == "text/plain" && !*have_body {
        article.body = String::from_utf8_lossy(&decoded).into_owned();
        *have_body = true;
        return Ok(());
    }

    let filename = part_filename(part_headers, &params);
    debug!(filename = %filename, mime = %media_type, "decoded attachment part");
    article
        .attachments
        .push(Attachment::new(filename, media_type, decoded));
    Ok(())
}

/// Filename of a part: `Content-Disposition` filename parameter, falling
/// back to the Content-Type `name` parameter.
fn part_filename(part_headers: &Headers, ctype_params: &HashMap<String, String>) -> String {
    if let Some(disposition) = part_headers.get(names::CONTENT_DISPOSITION) {
        if let Ok((_, params)) = parse_media_type(disposition) {
            if let Some(name) = params.get("filename") {
                return name.clone();
            }
        }
    }
    ctype_params.get("name").cloned().unwrap_or_default()
}

/// Decode a base64 body, tolerating line wrapping.
fn decode_base64_body(content: &[u8]) -> WireResult<Vec<u8>> {
    let compact: Vec<u8> = content
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(&compact)
        .map_err(|e| WireError::BadEncoding(e.to_string()))
}

/// Parse a `message/rfc822` signed envelope.
///
/// The body bytes are kept verbatim as the canonical signed payload. On a
/// valid signature the inner message is parsed into the signed view; on a
/// bad one the article stands with no signed view. A payload whose first
/// line is not newline-terminated cannot be canonicalized at all and
/// rejects the whole article.
fn parse_signed_envelope(article: &mut Article, body: &[u8]) -> WireResult<()> {
    let pubkey = article.pubkey().to_string();
    let signature = article.signature().to_string();
    if pubkey.is_empty() || signature.is_empty() {
        return Err(WireError::MissingSignatureHeaders);
    }

    article.signed_payload = Some(body.to_vec());

    match overchan_crypto::verify_payload(body, &pubkey, &signature) {
        Ok(()) => {
            let inner = parse_article(body)?;
            debug!(pubkey = %pubkey, msgid = %inner.message_id(), "verified signed envelope");
            article.signed_inner = Some(Box::new(inner));
        }
        Err(CryptoError::UnterminatedPayload) => {
            return Err(WireError::UnterminatedEnvelope);
        }
        Err(e) => {
            warn!(pubkey = %pubkey, error = %e, "signed envelope failed verification");
        }
    }
    Ok(())
}

/// Parse only the header block of an article.
pub fn parse_headers(data: &[u8]) -> WireResult<Headers> {
    split_header_block(data).map(|(h, _)| h)
}
