//! Dot-stuffed body transfer, shared by both session directions.

use crate::codec::LineCodec;
use crate::proto::{dot_stuff, dot_unstuff, is_terminator, READ_TIMEOUT};
use crate::{NntpError, NntpResult};
use futures::{SinkExt, StreamExt};
use overchan_store::{ArticleStore, StoreError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// A framed NNTP connection.
pub type NntpStream = Framed<TcpStream, LineCodec>;

/// Read one line with the idle timeout applied.
pub async fn read_line(framed: &mut NntpStream) -> NntpResult<String> {
    match tokio::time::timeout(READ_TIMEOUT, framed.next()).await {
        Err(_) => Err(NntpError::Timeout),
        Ok(None) => Err(NntpError::ConnectionClosed),
        Ok(Some(line)) => line,
    }
}

/// Send raw article bytes as a dot-stuffed body with terminator.
pub async fn send_body(framed: &mut NntpStream, raw: &[u8]) -> NntpResult<()> {
    let text = String::from_utf8_lossy(raw);
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    for line in lines {
        framed.feed(dot_stuff(line)).await?;
    }
    framed.send(".".to_string()).await?;
    Ok(())
}

/// Consume a dot-stuffed body without keeping it.
pub async fn drain_body(framed: &mut NntpStream) -> NntpResult<()> {
    loop {
        let line = read_line(framed).await?;
        if is_terminator(&line) {
            return Ok(());
        }
    }
}

/// Receive a dot-stuffed body into the temp store.
///
/// Returns `true` when the body landed in `incoming/<msgid>`, `false`
/// when another session already holds the temp lock (the body is then
/// consumed and discarded). With `rewrite_path` set, the first `Path: `
/// header line is rewritten to prepend that instance exactly once — the
/// one Path rewrite of the hop.
pub async fn receive_body_to_temp(
    framed: &mut NntpStream,
    store: &ArticleStore,
    msgid: &str,
    rewrite_path: Option<&str>,
) -> NntpResult<bool> {
    let file = match store.create_temp(msgid) {
        Ok(f) => f,
        Err(StoreError::Busy(_)) => {
            debug!(msgid = %msgid, "temp already open, discarding body");
            drain_body(framed).await?;
            return Ok(false);
        }
        Err(e) => {
            drain_body(framed).await?;
            return Err(e.into());
        }
    };

    let mut file = tokio::fs::File::from_std(file);
    let mut rewrote = false;

    let result: NntpResult<()> = async {
        loop {
            let line = read_line(framed).await?;
            if is_terminator(&line) {
                break;
            }
            let line = dot_unstuff(&line);

            if let Some(instance) = rewrite_path {
                if !rewrote {
                    if let Some(rest) = line.strip_prefix("Path: ") {
                        rewrote = true;
                        file.write_all(format!("Path: {}!{}\n", instance, rest).as_bytes())
                            .await?;
                        continue;
                    }
                }
            }

            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    match result {
        Ok(()) => Ok(true),
        Err(e) => {
            // a half-received body must not survive as a temp file
            if let Ok(path) = store.temp_path(msgid) {
                let _ = std::fs::remove_file(path);
            }
            Err(e)
        }
    }
}
