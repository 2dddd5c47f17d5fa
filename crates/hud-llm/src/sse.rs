//! Server-sent events decoding for streamed chat replies.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;

use crate::error::{LlmError, Result};

/// Sentinel payload that ends an OpenAI-style stream.
pub const DONE: &str = "[DONE]";

/// One decoded SSE item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseItem {
    /// A `data:` payload.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Line buffer that turns arbitrary byte chunks into `data:` payloads.
///
/// Lines are split on `\n` before decoding, so a multi-byte character cut
/// across two chunks is reassembled intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buf: Vec<u8>,
}

impl SseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every complete item it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseItem> {
        self.buf.extend_from_slice(chunk);

        let mut items = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(item) = parse_line(&line) {
                items.push(item);
            }
        }
        items
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<SseItem> {
        let line = std::mem::take(&mut self.buf);
        parse_line(&line)
    }
}

fn parse_line(line: &[u8]) -> Option<SseItem> {
    let line = String::from_utf8_lossy(line);
    let data = line.trim().strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        None
    } else if data == DONE {
        Some(SseItem::Done)
    } else {
        Some(SseItem::Data(data.to_string()))
    }
}

struct SseState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: SseBuffer,
    pending: VecDeque<String>,
    done: bool,
}

/// Turn an HTTP body stream into a stream of `data:` payloads.
///
/// The stream ends at `[DONE]` or when the body ends.
pub fn data_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = Result<String>> + Send + 'static {
    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            buffer: SseBuffer::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(data) = state.pending.pop_front() {
                    return Some((Ok(data), state));
                }
                if state.done {
                    return None;
                }

                let items = match state.byte_stream.next().await {
                    Some(Ok(chunk)) => state.buffer.push(&chunk),
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(LlmError::from(e)), state));
                    }
                    None => {
                        state.done = true;
                        state.buffer.finish().into_iter().collect()
                    }
                };

                for item in items {
                    match item {
                        SseItem::Data(data) => state.pending.push_back(data),
                        SseItem::Done => {
                            state.done = true;
                            break;
                        }
                    }
                }
            }
        },
    )
}
