//! Thumbnail generation via external tools.
//!
//! Dispatch is by extension: images go through `convert`, audio is
//! transcoded to wav and rendered as a sox spectrogram, everything else
//! gets a single ffmpeg frame.

use crate::error::{StoreError, StoreResult};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

/// Image extensions handled by `convert`.
const IMAGE_EXTS: &[&str] = &[".gif", ".ico", ".png", ".jpeg", ".jpg", ".webp"];

/// Audio extensions rendered as spectrograms.
const AUDIO_EXTS: &[&str] = &[".mp3", ".ogg", ".oga", ".opus", ".flac", ".m4a"];

fn has_ext(fname: &str, exts: &[&str]) -> bool {
    let lower = fname.to_ascii_lowercase();
    exts.iter().any(|ext| lower.ends_with(ext))
}

/// Is this an image we run through `convert`?
pub fn is_image(fname: &str) -> bool {
    has_ext(fname, IMAGE_EXTS)
}

/// Is this audio we render as a spectrogram?
pub fn is_audio(fname: &str) -> bool {
    has_ext(fname, AUDIO_EXTS)
}

/// External tool paths for thumbnail generation.
#[derive(Debug, Clone)]
pub struct Thumbnailer {
    /// ImageMagick `convert`.
    pub convert_bin: PathBuf,
    /// ffmpeg, for video frames and audio transcode.
    pub ffmpeg_bin: PathBuf,
    /// sox, for spectrograms.
    pub sox_bin: PathBuf,
}

impl Thumbnailer {
    /// Generate a thumbnail for `src` at `dst`, dispatching on the
    /// attachment filename.
    pub async fn generate(&self, fname: &str, src: &Path, dst: &Path) -> StoreResult<()> {
        if is_image(fname) {
            self.run(
                Command::new(&self.convert_bin)
                    .arg("-thumbnail")
                    .arg("200")
                    .arg(src)
                    .arg(dst),
            )
            .await
        } else if is_audio(fname) {
            self.spectrogram(src, dst).await
        } else {
            self.run(
                Command::new(&self.ffmpeg_bin)
                    .arg("-i")
                    .arg(src)
                    .arg("-vf")
                    .arg("scale=300:200")
                    .arg("-vframes")
                    .arg("1")
                    .arg(dst),
            )
            .await
        }
    }

    /// Transcode to wav, then render the first 30 seconds as a
    /// spectrogram. The intermediate wav is always removed.
    async fn spectrogram(&self, src: &Path, dst: &Path) -> StoreResult<()> {
        let mut wav = src.as_os_str().to_owned();
        wav.push(".wav");
        let wav = PathBuf::from(wav);

        let result = self
            .run(Command::new(&self.ffmpeg_bin).arg("-i").arg(src).arg(&wav))
            .await;
        let result = match result {
            Ok(()) => {
                self.run(
                    Command::new(&self.sox_bin)
                        .arg(&wav)
                        .arg("-n")
                        .arg("spectrogram")
                        .arg("-a")
                        .arg("-d")
                        .arg("0:30")
                        .arg("-r")
                        .arg("-p")
                        .arg("6")
                        .arg("-x")
                        .arg("200")
                        .arg("-y")
                        .arg("150")
                        .arg("-o")
                        .arg(dst),
                )
                .await
            }
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&wav).await;
        result
    }

    async fn run(&self, cmd: &mut Command) -> StoreResult<()> {
        debug!(cmd = ?cmd.as_std(), "running thumbnailer");
        let output = cmd.output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(StoreError::Thumbnail(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_dispatch() {
        assert!(is_image("a.PNG"));
        assert!(is_image("b.webp"));
        assert!(!is_image("c.webm"));
        assert!(is_audio("d.Mp3"));
        assert!(is_audio("e.opus"));
        assert!(!is_audio("f.png"));
    }
}
