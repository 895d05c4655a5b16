//! Minimal server-sent-events reader.
//!
//! Splits a byte stream into `event:`/`data:` frames. Used for both the
//! provider's streaming chat completions and the `/answer/stream` endpoint.
//! Only the fields this crate produces or consumes are understood; `id:`
//! and `retry:` lines are ignored.

use futures::{Stream, StreamExt};
use std::collections::VecDeque;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental line parser. Bytes may arrive split at any position,
/// including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseParser {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Feed raw bytes, returning every frame completed by them.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            if let Some(frame) = self.line(text.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Flush whatever is pending at end of input.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buf.is_empty() {
            let rest = std::mem::take(&mut self.buf);
            let text = String::from_utf8_lossy(&rest).into_owned();
            if let Some(frame) = self.line(text.trim_end_matches('\r')) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        if self.data.is_empty() && self.event.is_none() {
            return None;
        }
        let frame = SseFrame {
            event: self.event.take(),
            data: self.data.join("\n"),
        };
        self.data.clear();
        Some(frame)
    }
}

/// Adapt a byte stream into a stream of frames.
///
/// A transport error is yielded once and ends the stream.
pub fn frames<S, B, E>(body: S) -> impl Stream<Item = Result<SseFrame, E>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let state = (body, SseParser::default(), VecDeque::new(), false);

    futures::stream::unfold(
        state,
        |(mut body, mut parser, mut pending, mut ended)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (body, parser, pending, ended)));
                }
                if ended {
                    return None;
                }
                match body.next().await {
                    Some(Ok(chunk)) => pending.extend(parser.feed(chunk.as_ref())),
                    Some(Err(e)) => {
                        ended = true;
                        pending.clear();
                        return Some((Err(e), (body, parser, pending, ended)));
                    }
                    None => {
                        ended = true;
                        pending.extend(parser.finish());
                    }
                }
            }
        },
    )
}
