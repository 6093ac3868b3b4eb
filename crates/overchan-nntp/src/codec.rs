//! NNTP line framing.
//!
//! One frame is one text line. The decoder accepts `\r\n` and bare `\n`
//! terminators and strips them; the encoder always emits `\r\n`. Body
//! dot-stuffing happens above this layer, one line per frame.

use crate::{NntpError, NntpResult};
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest line we accept from a peer. Covers folded headers and base64
/// body lines with plenty of slack.
pub const MAX_LINE_LEN: usize = 16 * 1024;

/// Line codec for NNTP sessions.
#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = String;
    type Error = NntpError;

    fn decode(&mut self, src: &mut BytesMut) -> NntpResult<Option<String>> {
        let Some(idx) = src.iter().position(|&b| b == b'\n') else {
            if src.len() > MAX_LINE_LEN {
                return Err(NntpError::LineTooLong(src.len()));
            }
            return Ok(None);
        };

        if idx > MAX_LINE_LEN {
            return Err(NntpError::LineTooLong(idx));
        }

        let mut line = src.split_to(idx + 1);
        line.truncate(idx);
        if line.ends_with(b"\r") {
            line.truncate(idx - 1);
        }

        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }
}

impl Encoder<String> for LineCodec {
    type Error = NntpError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> NntpResult<()> {
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
