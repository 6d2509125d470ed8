// src/core/protocol/resp.rs

//! RESP2 frame representation and its `tokio_util::codec` encoder/decoder.

use crate::core::errors::FerroError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";

/// Protocol-level limits to keep a malformed or hostile frame from causing
/// unbounded allocation before we even know what command it is.
const MAX_ARRAY_ELEMENTS: usize = 1024 * 1024;
const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// A single RESP2 frame: either a client request (`Array` of `BulkString`s)
/// or a server reply (any variant).
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Convenience used by the AOF writer and tests: encode straight to an owned buffer.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, FerroError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }

    /// Builds the multi-bulk command frame a client would have sent, from a
    /// lowercase command name and its arguments. Used to serialize mutations
    /// for the AOF.
    pub fn command(name: &str, args: impl IntoIterator<Item = Bytes>) -> Self {
        let mut parts = vec![RespFrame::BulkString(Bytes::copy_from_slice(
            name.as_bytes(),
        ))];
        parts.extend(args.into_iter().map(RespFrame::BulkString));
        RespFrame::Array(parts)
    }
}

/// Decodes/encodes `RespFrame`s off a byte stream. Stateless: RESP2 needs no
/// per-connection negotiation.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = FerroError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => {
                dst.extend_from_slice(b"$-1\r\n");
            }
            RespFrame::Array(items) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(items.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for item in items {
                    self.encode(item, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = FerroError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RespFrame>, Self::Error> {
        decode_frame(src)
    }
}

/// Finds the index just past the next `\r\n` in `src`, without consuming it.
fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(2).position(|w| w == CRLF).map(|p| p + 2)
}

fn decode_frame(src: &mut BytesMut) -> Result<Option<RespFrame>, FerroError> {
    if src.is_empty() {
        return Ok(None);
    }
    let tag = src[0];
    let Some(line_end) = find_crlf(&src[1..]).map(|n| n + 1) else {
        return Ok(None);
    };
    let line = &src[1..line_end - 2];
    let line_str = std::str::from_utf8(line)
        .map_err(|_| FerroError::Protocol("non-utf8 header line".into()))?;

    match tag {
        b'+' => {
            let s = line_str.to_string();
            src.advance(line_end);
            Ok(Some(RespFrame::SimpleString(s)))
        }
        b'-' => {
            let s = line_str.to_string();
            src.advance(line_end);
            Ok(Some(RespFrame::Error(s)))
        }
        b':' => {
            let n: i64 = line_str
                .parse()
                .map_err(|_| FerroError::Protocol("invalid integer frame".into()))?;
            src.advance(line_end);
            Ok(Some(RespFrame::Integer(n)))
        }
        b'$' => {
            let len: i64 = line_str
                .parse()
                .map_err(|_| FerroError::Protocol("invalid bulk length".into()))?;
            if len == -1 {
                src.advance(line_end);
                return Ok(Some(RespFrame::Null));
            }
            if len < 0 || len as usize > MAX_BULK_LEN {
                return Err(FerroError::Protocol("bulk string too large".into()));
            }
            let total_needed = line_end + len as usize + 2;
            if src.len() < total_needed {
                return Ok(None);
            }
            let data = Bytes::copy_from_slice(&src[line_end..line_end + len as usize]);
            src.advance(total_needed);
            Ok(Some(RespFrame::BulkString(data)))
        }
        b'*' => {
            let count: i64 = line_str
                .parse()
                .map_err(|_| FerroError::Protocol("invalid array length".into()))?;
            if count == -1 {
                src.advance(line_end);
                return Ok(Some(RespFrame::Array(Vec::new())));
            }
            if count < 0 || count as usize > MAX_ARRAY_ELEMENTS {
                return Err(FerroError::Protocol("array too large".into()));
            }
            // Speculatively consume the header, restoring it if an element is incomplete.
            let mut probe = src.clone();
            probe.advance(line_end);
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                match decode_frame(&mut probe)? {
                    Some(frame) => items.push(frame),
                    None => return Ok(None),
                }
            }
            let consumed = src.len() - probe.len();
            src.advance(consumed);
            Ok(Some(RespFrame::Array(items)))
        }
        other => Err(FerroError::Protocol(format!(
            "unknown frame tag '{}'",
            other as char
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_command_array() {
        let frame = RespFrame::command(
            "set",
            [Bytes::from_static(b"foo"), Bytes::from_static(b"bar")],
        );
        let encoded = frame.encode_to_vec().unwrap();
        assert_eq!(encoded, b"*3\r\n$3\r\nset\r\n$3\r\nfoo\r\n$3\r\nbar\r\n");

        let mut buf = BytesMut::from(&encoded[..]);
        let decoded = decode_frame(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_returns_none_on_partial_frame() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nfoo\r\n"[..]);
        assert!(decode_frame(&mut buf).unwrap().is_none());
    }

    #[test]
    fn encodes_null_bulk_and_replies() {
        assert_eq!(RespFrame::Null.encode_to_vec().unwrap(), b"$-1\r\n");
        assert_eq!(
            RespFrame::SimpleString("OK".into()).encode_to_vec().unwrap(),
            b"+OK\r\n"
        );
        assert_eq!(
            RespFrame::Error("ERR boom".into()).encode_to_vec().unwrap(),
            b"-ERR boom\r\n"
        );
    }
}
