use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::Frame;
use crate::parser::{RawFrame, parse_frame_slice, unescape_header_value};

/// Escape a STOMP 1.2 header name or value for wire transmission.
fn escape_header(input: &str, dst: &mut BytesMut) {
    for ch in input.chars() {
        match ch {
            '\\' => dst.put_slice(b"\\\\"),
            '\r' => dst.put_slice(b"\\r"),
            '\n' => dst.put_slice(b"\\n"),
            ':' => dst.put_slice(b"\\c"),
            _ => {
                let mut buf = [0u8; 4];
                dst.put_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn invalid_data(what: &str, detail: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", what, detail))
}

fn header_string(raw: &[u8], what: &str) -> Result<String, io::Error> {
    let unescaped =
        unescape_header_value(raw).map_err(|e| invalid_data(&format!("invalid escape in {}", what), e))?;
    String::from_utf8(unescaped).map_err(|e| invalid_data(&format!("invalid utf8 in {}", what), e))
}

impl TryFrom<RawFrame> for Frame {
    type Error = io::Error;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        let command =
            String::from_utf8(raw.command).map_err(|e| invalid_data("invalid utf8 in command", e))?;
        let headers = raw
            .headers
            .iter()
            .map(|(k, v)| -> Result<(String, String), io::Error> {
                Ok((header_string(k, "header key")?, header_string(v, "header value")?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Frame {
            command,
            headers,
            body: raw.body,
        })
    }
}

/// Items produced or consumed by the codec.
///
/// A `StompItem` is either a decoded `Frame` or a `Heartbeat` marker
/// representing a single EOL received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    /// A decoded STOMP frame (command + headers + body)
    Frame(Frame),
    /// A single heartbeat pulse (LF or CRLF)
    Heartbeat,
}

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// STOMP wire protocol.
///
/// Decoding supports both NUL-terminated frames and frames using the
/// `content-length` header for binary bodies. Encoding escapes header names
/// and values and adds `content-length` when the body could not otherwise be
/// delimited.
#[derive(Debug, Default)]
pub struct StompCodec;

impl StompCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = io::Error;

    /// Decode one `StompItem` from `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when the buffered bytes
    /// do not yet hold a complete frame.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match src.chunk() {
            [b'\n', ..] => {
                src.advance(1);
                return Ok(Some(StompItem::Heartbeat));
            }
            [b'\r', b'\n', ..] => {
                src.advance(2);
                return Ok(Some(StompItem::Heartbeat));
            }
            [b'\r'] => return Ok(None),
            _ => {}
        }

        match parse_frame_slice(src.chunk()) {
            Ok(Some((raw, consumed))) => {
                src.advance(consumed);
                Ok(Some(StompItem::Frame(Frame::try_from(raw)?)))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(invalid_data("parse error", e)),
        }
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = io::Error;

    /// Append the wire form of `item` to `dst`.
    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let frame = match item {
            StompItem::Heartbeat => {
                dst.put_u8(b'\n');
                return Ok(());
            }
            StompItem::Frame(frame) => frame,
        };

        dst.extend_from_slice(frame.command.as_bytes());
        dst.put_u8(b'\n');

        let has_cl = frame
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case("content-length"));
        for (k, v) in &frame.headers {
            escape_header(k, dst);
            dst.put_u8(b':');
            escape_header(v, dst);
            dst.put_u8(b'\n');
        }
        if !has_cl && (frame.body.contains(&0) || std::str::from_utf8(&frame.body).is_err()) {
            dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }

        dst.put_u8(b'\n');
        dst.extend_from_slice(&frame.body);
        dst.put_u8(0);
        Ok(())
    }
}
