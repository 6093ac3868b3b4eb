//! Content-addressed article store.
//!
//! Layout: four flat directories. Committed articles live at
//! `store/<MessageID>`, inbound bodies stream into `incoming/<MessageID>`,
//! attachments and thumbnails are content-addressed files.

use crate::error::{StoreError, StoreResult};
use crate::thumbnail::Thumbnailer;
use overchan_index::{ArticleRecord, Database};
use overchan_wire::{article_bytes, parse_headers, valid_message_id, Article, Attachment, Headers};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Store directory and tool configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Committed article files.
    pub store_dir: PathBuf,
    /// In-flight inbound articles.
    pub incoming_dir: PathBuf,
    /// Content-addressed attachments.
    pub attachments_dir: PathBuf,
    /// Thumbnail derivatives.
    pub thumbs_dir: PathBuf,
    /// ImageMagick convert binary.
    pub convert_bin: PathBuf,
    /// ffmpeg binary.
    pub ffmpeg_bin: PathBuf,
    /// sox binary.
    pub sox_bin: PathBuf,
}

impl StoreConfig {
    /// Standard layout under a single root, with default tool paths.
    pub fn under_root(root: &Path) -> Self {
        Self {
            store_dir: root.join("store"),
            incoming_dir: root.join("incoming"),
            attachments_dir: root.join("attachments"),
            thumbs_dir: root.join("thumbs"),
            convert_bin: PathBuf::from("/usr/bin/convert"),
            ffmpeg_bin: PathBuf::from("/usr/bin/ffmpeg"),
            sox_bin: PathBuf::from("/usr/bin/sox"),
        }
    }
}

/// The article store.
///
/// Externally synchronized by Message-ID: `create_temp` refuses a second
/// opener for the same ID, so two inbound streams cannot race one
/// article. Attachment writes are idempotent by content address.
#[derive(Clone)]
pub struct ArticleStore {
    config: StoreConfig,
    index: Arc<dyn Database>,
    thumbnailer: Thumbnailer,
    /// Bounds concurrent thumbnail subprocesses to the core count.
    thumb_slots: Arc<Semaphore>,
}

impl ArticleStore {
    /// Open the store, creating its directories.
    pub fn open(config: StoreConfig, index: Arc<dyn Database>) -> StoreResult<Self> {
        fs::create_dir_all(&config.store_dir)?;
        fs::create_dir_all(&config.incoming_dir)?;
        fs::create_dir_all(&config.attachments_dir)?;
        fs::create_dir_all(&config.thumbs_dir)?;
        info!(store = ?config.store_dir, "article store ready");
        let thumbnailer = Thumbnailer {
            convert_bin: config.convert_bin.clone(),
            ffmpeg_bin: config.ffmpeg_bin.clone(),
            sox_bin: config.sox_bin.clone(),
        };
        Ok(Self {
            config,
            index,
            thumbnailer,
            thumb_slots: Arc::new(Semaphore::new(num_cpus::get().max(1))),
        })
    }

    /// The index this store registers into.
    pub fn index(&self) -> &Arc<dyn Database> {
        &self.index
    }

    /// The incoming directory (startup replay walks it).
    pub fn incoming_dir(&self) -> &Path {
        &self.config.incoming_dir
    }

    /// Committed path for a Message-ID.
    pub fn article_path(&self, msgid: &str) -> StoreResult<PathBuf> {
        if !valid_message_id(msgid) {
            return Err(StoreError::InvalidMessageId(msgid.to_string()));
        }
        Ok(self.config.store_dir.join(msgid))
    }

    /// Temp path for a Message-ID.
    pub fn temp_path(&self, msgid: &str) -> StoreResult<PathBuf> {
        if !valid_message_id(msgid) {
            return Err(StoreError::InvalidMessageId(msgid.to_string()));
        }
        Ok(self.config.incoming_dir.join(msgid))
    }

    /// Path of a content-addressed attachment file.
    pub fn attachment_path(&self, name: &str) -> PathBuf {
        self.config.attachments_dir.join(name)
    }

    /// Path of an attachment's thumbnail. Gif thumbnails keep their
    /// extension, everything else renders to jpeg.
    pub fn thumb_path(&self, name: &str) -> PathBuf {
        if name.ends_with(".gif") {
            self.config.thumbs_dir.join(name)
        } else {
            self.config.thumbs_dir.join(format!("{}.jpg", name))
        }
    }

    /// Open the temp file for an inbound article. Fails with
    /// [`StoreError::Busy`] when another session is already receiving the
    /// same Message-ID.
    pub fn create_temp(&self, msgid: &str) -> StoreResult<fs::File> {
        let path = self.temp_path(msgid)?;
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::Busy(msgid.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically move a finished temp file into the committed store.
    pub fn commit_temp(&self, msgid: &str) -> StoreResult<()> {
        let from = self.temp_path(msgid)?;
        let to = self.article_path(msgid)?;
        fs::rename(from, to)?;
        Ok(())
    }

    /// Do we have a committed article? Invalid IDs are simply absent.
    pub fn has(&self, msgid: &str) -> bool {
        self.article_path(msgid)
            .map(|p| p.exists())
            .unwrap_or(false)
    }

    /// Read and parse a committed article.
    pub fn read(&self, msgid: &str) -> StoreResult<Article> {
        let path = self.article_path(msgid)?;
        let data = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(msgid.to_string()),
            _ => StoreError::Io(e),
        })?;
        Ok(overchan_wire::parse_article(&data)?)
    }

    /// Raw bytes of a committed article (for reader-mode serving).
    pub fn read_raw(&self, msgid: &str) -> StoreResult<Vec<u8>> {
        let path = self.article_path(msgid)?;
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(msgid.to_string()),
            _ => StoreError::Io(e),
        })
    }

    /// Header block of a committed article.
    pub fn headers(&self, msgid: &str) -> StoreResult<Headers> {
        let raw = self.read_raw(msgid)?;
        Ok(parse_headers(&raw)?)
    }

    /// Read and consume a temp article: the file is deleted whether or not
    /// it parses.
    pub fn read_temp(&self, msgid: &str) -> StoreResult<Article> {
        let path = self.temp_path(msgid)?;
        let data = fs::read(&path);
        let _ = fs::remove_file(&path);
        Ok(overchan_wire::parse_article(&data?)?)
    }

    /// Delete a committed article file. Missing files are fine.
    pub fn delete(&self, msgid: &str) -> StoreResult<()> {
        let path = self.article_path(msgid)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Names of every stored attachment.
    pub fn all_attachments(&self) -> StoreResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.attachments_dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Idempotently persist an attachment: write-to-temp, fsync, rename.
    /// A file already at the content address is left untouched.
    pub fn store_attachment(&self, att: &Attachment) -> StoreResult<()> {
        let name = att.filepath();
        let target = self.attachment_path(&name);
        if target.exists() {
            debug!(name = %name, "attachment already stored");
            return Ok(());
        }
        let tmp = self.attachment_path(&format!("{}.tmp", name));
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(att.data())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &target)?;
        debug!(name = %name, bytes = att.data().len(), "stored attachment");
        Ok(())
    }

    /// Generate the thumbnail for a stored attachment.
    pub async fn generate_thumbnail(&self, name: &str) -> StoreResult<()> {
        let src = self.attachment_path(name);
        let dst = self.thumb_path(name);
        self.thumbnailer.generate(name, &src, &dst).await
    }

    /// Commit a parsed article: serialize to the store, register the
    /// indexed view, record the author key of a verified envelope, and
    /// fan attachment persistence out to background tasks.
    ///
    /// Ingesting the same article twice leaves the store unchanged.
    pub fn store_post(&self, article: &Article) -> StoreResult<()> {
        let msgid = article.message_id().to_string();
        let path = self.article_path(&msgid)?;
        fs::write(&path, article_bytes(article, "\n"))?;

        // the signed view is what gets indexed; the envelope itself only
        // contributes the author key
        let view = article.signed().unwrap_or(article);
        self.index.register_article(&ArticleRecord::from_article(view))?;
        if article.signed().is_some() {
            self.index.register_signed(&msgid, article.pubkey())?;
        }

        for att in view.attachments.clone() {
            let store = self.clone();
            tokio::spawn(async move {
                store.save_attachment(att).await;
            });
        }
        Ok(())
    }

    /// Persist one attachment and its thumbnail, logging failures; a
    /// missing thumbnail never invalidates the article.
    pub async fn save_attachment(&self, att: Attachment) {
        let Ok(_permit) = self.thumb_slots.clone().acquire_owned().await else {
            return;
        };
        let name = att.filepath();

        if let Err(e) = self.store_attachment(&att) {
            warn!(name = %name, error = %e, "failed to store attachment");
            return;
        }

        if att.needs_thumbnail() && !self.thumb_path(&name).exists() {
            if let Err(e) = self.generate_thumbnail(&name).await {
                warn!(name = %name, error = %e, "failed to generate thumbnail");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overchan_index::MemoryIndex;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, ArticleStore, Arc<MemoryIndex>) {
        let dir = TempDir::new().unwrap();
        let index = Arc::new(MemoryIndex::new());
        let store = ArticleStore::open(
            StoreConfig::under_root(dir.path()),
            index.clone() as Arc<dyn Database>,
        )
        .unwrap();
        (dir, store, index)
    }

    fn sample_article(msgid: &str) -> Article {
        let mut a = Article::plaintext(
            "body text",
            "poster@example",
            "subject",
            "poster",
            "relay.example",
            msgid.to_string(),
            "overchan.test",
        );
        a.pack();
        a
    }

    #[test]
    fn create_temp_locks_per_msgid() {
        let (_dir, store, _) = open_store();
        let first = store.create_temp("<a@x>");
        assert!(first.is_ok());
        assert!(matches!(store.create_temp("<a@x>"), Err(StoreError::Busy(_))));
    }

    #[test]
    fn create_temp_rejects_invalid_ids() {
        let (_dir, store, _) = open_store();
        for bad in ["<../evil@x>", "<a/b@x>", "no-brackets", "<a b@x>"] {
            assert!(
                matches!(store.create_temp(bad), Err(StoreError::InvalidMessageId(_))),
                "accepted {:?}",
                bad
            );
            assert!(!store.has(bad));
        }
    }

    #[test]
    fn commit_temp_moves_to_store() {
        let (_dir, store, _) = open_store();
        let mut f = store.create_temp("<a@x>").unwrap();
        f.write_all(b"Message-ID: <a@x>\n\nhi\n").unwrap();
        drop(f);
        assert!(!store.has("<a@x>"));
        store.commit_temp("<a@x>").unwrap();
        assert!(store.has("<a@x>"));
        assert_eq!(store.read("<a@x>").unwrap().body, "hi");
    }

    #[test]
    fn read_temp_consumes_file() {
        let (_dir, store, _) = open_store();
        let mut f = store.create_temp("<a@x>").unwrap();
        f.write_all(b"Message-ID: <a@x>\n\nhi\n").unwrap();
        drop(f);
        let article = store.read_temp("<a@x>").unwrap();
        assert_eq!(article.message_id(), "<a@x>");
        // consumed: the lock is free again
        assert!(store.create_temp("<a@x>").is_ok());
    }

    #[tokio::test]
    async fn store_post_is_idempotent() {
        let (_dir, store, index) = open_store();
        let article = sample_article("<p@x>");

        store.store_post(&article).unwrap();
        let first = fs::read(store.article_path("<p@x>").unwrap()).unwrap();

        store.store_post(&article).unwrap();
        let second = fs::read(store.article_path("<p@x>").unwrap()).unwrap();

        assert_eq!(first, second);
        assert_eq!(index.article_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn store_post_registers_index() {
        let (_dir, store, index) = open_store();
        store.store_post(&sample_article("<p@x>")).unwrap();
        assert!(index.has_article("<p@x>").unwrap());
        assert!(index.signed_pubkey("<p@x>").unwrap().is_none());
    }

    #[test]
    fn attachment_storage_is_idempotent() {
        let (_dir, store, _) = open_store();
        let att = Attachment::new("pic.png", "image/png", vec![1, 2, 3]);
        store.store_attachment(&att).unwrap();
        store.store_attachment(&att).unwrap();
        assert_eq!(store.all_attachments().unwrap().len(), 1);

        let expected = overchan_crypto::content_address(&[1, 2, 3], ".png");
        assert!(store.attachment_path(&expected).exists());
    }

    #[test]
    fn thumb_paths() {
        let (_dir, store, _) = open_store();
        assert!(store
            .thumb_path("HASH.gif")
            .to_string_lossy()
            .ends_with("HASH.gif"));
        assert!(store
            .thumb_path("HASH.png")
            .to_string_lossy()
            .ends_with("HASH.png.jpg"));
    }

    #[test]
    fn delete_is_tolerant() {
        let (_dir, store, _) = open_store();
        assert!(store.delete("<gone@x>").is_ok());
    }
}
