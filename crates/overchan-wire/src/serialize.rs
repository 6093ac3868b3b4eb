//! Article serialization.
//!
//! The same writer serves both forms: `\r\n` line endings on the wire,
//! `\n` for the on-disk article files. Serialization is deterministic so
//! a committed article re-serializes to identical bytes.

use crate::article::{derive_boundary, Article};
use crate::attachment::Attachment;
use crate::headers::names;
use crate::parse::parse_media_type;
use base64::Engine;
use std::io::Write;

/// Width of base64 body lines.
const BASE64_LINE_WIDTH: usize = 76;

/// Serialize an article with the given line ending.
pub fn write_article<W: Write>(
    article: &Article,
    w: &mut W,
    line_ending: &str,
) -> std::io::Result<()> {
    for (name, value) in article.headers.iter() {
        write!(w, "{}: {}{}", name, value, line_ending)?;
    }
    w.write_all(line_ending.as_bytes())?;

    if let Some(payload) = &article.signed_payload {
        return write_payload(payload, w, line_ending);
    }

    if !article.attachments.is_empty() {
        return write_multipart(article, w, line_ending);
    }

    write_text(&article.body, w, line_ending)
}

/// Serialize to a byte vector.
pub fn article_bytes(article: &Article, line_ending: &str) -> Vec<u8> {
    let mut out = Vec::new();
    // Vec<u8> writes cannot fail
    write_article(article, &mut out, line_ending).expect("write to Vec");
    out
}

/// Write a canonical signed payload, converting line endings but keeping
/// line content byte-exact.
fn write_payload<W: Write>(payload: &[u8], w: &mut W, line_ending: &str) -> std::io::Result<()> {
    let mut rest = payload;
    while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
        w.write_all(&rest[..pos])?;
        w.write_all(line_ending.as_bytes())?;
        rest = &rest[pos + 1..];
    }
    if !rest.is_empty() {
        w.write_all(rest)?;
    }
    Ok(())
}

/// Write a plaintext body, one line at a time.
fn write_text<W: Write>(body: &str, w: &mut W, line_ending: &str) -> std::io::Result<()> {
    for line in body.split('\n') {
        write!(w, "{}{}", line, line_ending)?;
    }
    Ok(())
}

/// Write the multipart form: first part is the plaintext body, every
/// attachment follows base64-encoded.
fn write_multipart<W: Write>(
    article: &Article,
    w: &mut W,
    line_ending: &str,
) -> std::io::Result<()> {
    let boundary = multipart_boundary(article);

    write!(w, "--{}{}", boundary, line_ending)?;
    write!(
        w,
        "{}: text/plain; charset=UTF-8{}",
        names::CONTENT_TYPE,
        line_ending
    )?;
    w.write_all(line_ending.as_bytes())?;
    write_text(&article.body, w, line_ending)?;

    for att in &article.attachments {
        write!(w, "--{}{}", boundary, line_ending)?;
        write_attachment_part(att, w, line_ending)?;
    }
    write!(w, "--{}--{}", boundary, line_ending)?;
    Ok(())
}

/// Boundary for serialization: reuse the packed header's boundary when
/// present so reserialization is stable, else derive one.
fn multipart_boundary(article: &Article) -> String {
    if let Ok((_, params)) = parse_media_type(article.content_type()) {
        if let Some(b) = params.get("boundary") {
            return b.clone();
        }
    }
    derive_boundary(article.message_id())
}

/// One attachment part: headers then wrapped base64 data.
fn write_attachment_part<W: Write>(
    att: &Attachment,
    w: &mut W,
    line_ending: &str,
) -> std::io::Result<()> {
    write!(w, "{}: {}{}", names::CONTENT_TYPE, att.mime(), line_ending)?;
    write!(
        w,
        "{}: form-data; filename=\"{}\"; name=\"attachment\"{}",
        names::CONTENT_DISPOSITION,
        att.filename(),
        line_ending
    )?;
    write!(
        w,
        "{}: base64{}",
        names::CONTENT_TRANSFER_ENCODING,
        line_ending
    )?;
    w.write_all(line_ending.as_bytes())?;

    let encoded = base64::engine::general_purpose::STANDARD.encode(att.data());
    let bytes = encoded.as_bytes();
    for chunk in bytes.chunks(BASE64_LINE_WIDTH) {
        w.write_all(chunk)?;
        w.write_all(line_ending.as_bytes())?;
    }
    if bytes.is_empty() {
        w.write_all(line_ending.as_bytes())?;
    }
    Ok(())
}
