//! Article attachments.

use overchan_crypto::{content_address, sha512};

/// Extensions that get a thumbnail derivative.
const THUMBNAIL_EXTS: &[&str] = &[
    ".png", ".jpeg", ".jpg", ".gif", ".bmp", ".webm", ".mp4", ".avi", ".mpeg", ".mpg", ".ogg",
    ".mp3", ".oga", ".opus", ".flac", ".ico",
];

/// Derive a file extension from a filename: the last `.`-suffix, or
/// `.txt` when there is none.
pub fn ext_of(filename: &str) -> String {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => filename[idx..].to_string(),
        _ => ".txt".to_string(),
    }
}

/// An immutable decoded attachment.
///
/// The on-disk name is fully determined by the content hash and the
/// extension, so byte-equal attachments collide to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    filename: String,
    mime: String,
    ext: String,
    hash: [u8; 64],
    data: Vec<u8>,
}

impl Attachment {
    /// Build an attachment from decoded bytes.
    pub fn new(filename: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        let filename = filename.into();
        let ext = ext_of(&filename);
        Self {
            hash: sha512(&data),
            filename,
            mime: mime.into(),
            ext,
            data,
        }
    }

    /// Original filename as uploaded.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// MIME type.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// File extension including the leading dot.
    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// SHA-512 of the decoded bytes.
    pub fn hash(&self) -> &[u8; 64] {
        &self.hash
    }

    /// Decoded bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Content-addressed on-disk name: `base32(sha512(data)) + ext`.
    pub fn filepath(&self) -> String {
        content_address(&self.data, &self.ext)
    }

    /// Does this attachment type get a thumbnail?
    pub fn needs_thumbnail(&self) -> bool {
        let ext = self.ext.to_ascii_lowercase();
        THUMBNAIL_EXTS.contains(&ext.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_defaults_to_txt() {
        assert_eq!(ext_of("noext"), ".txt");
        assert_eq!(ext_of(""), ".txt");
        assert_eq!(ext_of(".hidden"), ".txt");
    }

    #[test]
    fn ext_takes_last_suffix() {
        assert_eq!(ext_of("a.tar.gz"), ".gz");
        assert_eq!(ext_of("pic.PNG"), ".PNG");
    }

    #[test]
    fn filepath_is_content_addressed() {
        let a = Attachment::new("x.png", "image/png", vec![1, 2, 3]);
        let b = Attachment::new("y.png", "image/png", vec![1, 2, 3]);
        // same bytes + ext collide regardless of filename
        assert_eq!(a.filepath(), b.filepath());
        assert!(a.filepath().ends_with(".png"));
    }

    #[test]
    fn thumbnail_by_extension() {
        assert!(Attachment::new("a.jpg", "image/jpeg", vec![]).needs_thumbnail());
        assert!(Attachment::new("a.OGG", "audio/ogg", vec![]).needs_thumbnail());
        assert!(!Attachment::new("a.pdf", "application/pdf", vec![]).needs_thumbnail());
        assert!(!Attachment::new("a", "text/plain", vec![]).needs_thumbnail());
    }
}
