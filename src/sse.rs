//! Server-sent event decoding for the chat stream
//!
//! The chat endpoint answers with `text/event-stream`; each event carries one
//! `data:` line holding a flat JSON object. Bytes are buffered until a blank
//! line closes the event, so multi-byte characters split across chunks
//! decode correctly.

use crate::error::{ClientError, Result};
use crate::types::WireEvent;
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use std::collections::VecDeque;

/// Incremental SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<WireEvent> {
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end).collect();
            self.buffer.drain(..2);
            if let Some(event) = parse_block(&block) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a trailing event that was not terminated by a blank line
    ///
    /// A trailing payload that does not parse means the body was cut off
    /// mid-event, which is reported as `ClientError::Stream`.
    pub fn finish(&mut self) -> Result<Option<WireEvent>> {
        let block = std::mem::take(&mut self.buffer);
        match block_data(&block) {
            Some(data) => serde_json::from_str(&data).map(Some).map_err(|e| {
                ClientError::Stream(format!("body ended mid-event ({} bytes): {}", data.len(), e))
            }),
            None => Ok(None),
        }
    }
}

fn find_blank_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

/// Joined `data:` payload of a block; `None` for comments, empty blocks
/// and the `[DONE]` sentinel
fn block_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let mut data = String::new();

    for line in text.lines() {
        let Some(value) = line.strip_prefix("data:") else {
            continue;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);
        if !data.is_empty() {
            data.push('\n');
        }
        data.push_str(value);
    }

    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data.to_string())
}

fn parse_block(block: &[u8]) -> Option<WireEvent> {
    let data = block_data(block)?;
    match serde_json::from_str::<WireEvent>(&data) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed stream event");
            None
        }
    }
}

/// Turn a byte stream into a stream of decoded events
///
/// Transport errors are yielded once and end the stream. Dropping the
/// returned stream drops the underlying body.
pub fn decode<S, E>(body: S) -> BoxStream<'static, Result<WireEvent>>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct State<S> {
        body: S,
        decoder: SseDecoder,
        pending: VecDeque<WireEvent>,
        done: bool,
    }

    let state = State {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.decoder.push(&chunk)),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(ClientError::Transport(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    match state.decoder.finish() {
                        Ok(event) => state.pending.extend(event),
                        Err(e) => return Some((Err(e), state)),
                    }
                }
            }
        }
    })
    .boxed()
}
