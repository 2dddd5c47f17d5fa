//! Content-Length framing for the stdio transport.
//!
//! Outbound messages are serialized and prefixed with
//! `Content-Length: <N>\r\n\r\n`. Inbound bytes arrive in arbitrary chunks
//! and are accumulated in a [`FrameDecoder`] until whole frames can be cut
//! out of it.

use std::sync::LazyLock;

use bytes::{Buf, BytesMut};
use regex::bytes::Regex;
use serde::Serialize;
use serde_json::Value;

/// Header terminator pattern. Case-insensitive, any whitespace after the colon.
static HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Content-Length:\s*(\d+)\r\n\r\n").expect("frame header pattern is valid")
});

/// Initial capacity of the decode buffer.
const INITIAL_CAPACITY: usize = 8 * 1024;

/// Serialize `message` and prepend the Content-Length header.
pub fn encode_frame<T: Serialize>(message: &T) -> serde_json::Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());

    let mut frame = Vec::with_capacity(header.len() + body.len());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Incremental de-framer over a growing byte buffer.
///
/// Bytes are only ever removed from the buffer when a complete frame is cut
/// out. Anything preceding a matched header is discarded with that frame.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append freshly read bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Number of bytes waiting in the buffer.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Cut the next complete frame out of the buffer.
    ///
    /// Returns `None` when no complete frame is buffered yet. A frame whose
    /// body is not valid JSON is still removed from the buffer and comes back
    /// as `Some(Err(_))`, so the caller can drop it and keep draining.
    pub fn next_frame(&mut self) -> Option<serde_json::Result<Value>> {
        loop {
            let (header_end, declared) = {
                let caps = HEADER.captures(&self.buf)?;
                let header_end = caps.get(0)?.end();
                let declared = std::str::from_utf8(caps.get(1)?.as_bytes())
                    .ok()
                    .and_then(|digits| digits.parse::<usize>().ok());
                (header_end, declared)
            };

            let Some(len) = declared else {
                tracing::debug!(header_end, "skipping frame header with unusable length");
                self.buf.advance(header_end);
                continue;
            };

            if self.buf.len() - header_end < len {
                return None;
            }

            self.buf.advance(header_end);
            let body = self.buf.split_to(len).freeze();
            return Some(serde_json::from_slice(&body));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_all(decoder: &mut FrameDecoder) -> Vec<Value> {
        let mut out = Vec::new();
        while let Some(frame) = decoder.next_frame() {
            if let Ok(value) = frame {
                out.push(value);
            }
        }
        out
    }

    #[test]
    fn test_encode_header_counts_bytes() {
        let msg = json!({"text": "héllo"});
        let frame = encode_frame(&msg).unwrap();
        let body = serde_json::to_vec(&msg).unwrap();
        let expected_header = format!("Content-Length: {}\r\n\r\n", body.len());
        assert!(frame.starts_with(expected_header.as_bytes()));
        assert_eq!(&frame[expected_header.len()..], body.as_slice());
    }

    #[test]
    fn test_round_trip() {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": 7,
            "result": {"tools": [{"name": "echo"}], "nested": [1, 2.5, null, "x"]}
        });
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode_frame(&msg).unwrap());

        assert_eq!(decode_all(&mut decoder), vec![msg]);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_partial_delivery_at_every_split_point() {
        let msg = json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        let frame = encode_frame(&msg).unwrap();

        for split in 1..frame.len() {
            let mut decoder = FrameDecoder::new();
            decoder.push(&frame[..split]);
            assert!(decoder.next_frame().is_none(), "split at {split}");
            decoder.push(&frame[split..]);
            assert_eq!(decode_all(&mut decoder), vec![msg.clone()], "split at {split}");
        }
    }

    #[test]
    fn test_byte_by_byte_delivery() {
        let msg = json!({"id": 3, "result": "slow"});
        let frame = encode_frame(&msg).unwrap();
        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();

        for byte in frame {
            decoder.push(&[byte]);
            decoded.extend(decode_all(&mut decoder));
        }

        assert_eq!(decoded, vec![msg]);
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let first = json!({"id": 1, "result": "a"});
        let second = json!({"id": 2, "result": "b"});
        let mut bytes = encode_frame(&first).unwrap();
        bytes.extend(encode_frame(&second).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert_eq!(decode_all(&mut decoder), vec![first, second]);
    }

    #[test]
    fn test_trailing_partial_frame_is_kept() {
        let first = json!({"id": 1});
        let second = json!({"id": 2});
        let second_frame = encode_frame(&second).unwrap();
        let mut bytes = encode_frame(&first).unwrap();
        bytes.extend_from_slice(&second_frame[..10]);

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert_eq!(decode_all(&mut decoder), vec![first]);
        assert_eq!(decoder.buffered(), 10);

        decoder.push(&second_frame[10..]);
        assert_eq!(decode_all(&mut decoder), vec![second]);
    }

    #[test]
    fn test_malformed_body_does_not_poison_next_frame() {
        let mut bytes = b"Content-Length: 9\r\n\r\n{not json".to_vec();
        let good = json!({"id": 5, "result": 1});
        bytes.extend(encode_frame(&good).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        assert!(matches!(decoder.next_frame(), Some(Err(_))));
        assert_eq!(decoder.next_frame().unwrap().unwrap(), good);
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_header_is_case_insensitive_and_tolerates_spacing() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"content-length:   2\r\n\r\n{}");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), json!({}));
    }

    #[test]
    fn test_noise_before_header_is_discarded_with_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"server booting...\nContent-Length: 2\r\n\r\n[]");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), json!([]));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversized_length_is_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"Content-Length: 999999999999999999999999999\r\n\r\n");
        decoder.push(&encode_frame(&json!({"id": 9})).unwrap());
        assert_eq!(decode_all(&mut decoder), vec![json!({"id": 9})]);
    }
}
