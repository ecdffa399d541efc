//! Incremental decoding of deployment event streams.
//!
//! The server writes lines of the form `data: <json>` separated by blank lines.
//! Chunks can split a line (or a UTF-8 sequence) anywhere, so decoding is
//! buffered: only complete lines are parsed and the trailing fragment waits for
//! the next chunk.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use shipdeck_common::{ProgressEvent, StreamError};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, warn};

/// Prefix marking a significant line
pub const EVENT_PREFIX: &str = "data: ";

/// Response body as a stream of byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Stream-aware UTF-8 decoding that carries incomplete sequences across chunks
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end; wait for more bytes
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        self.pending.clear();
        Some(char::REPLACEMENT_CHARACTER.to_string())
    }
}

/// Longest incomplete line kept while waiting for its newline
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Turns byte chunks into progress events, in order
#[derive(Debug)]
pub struct EventDecoder {
    utf8: Utf8Decoder,
    buffer: String,
    max_line: usize,
    /// Inside an oversized line; skip until the next newline
    discarding: bool,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            utf8: Utf8Decoder::default(),
            buffer: String::new(),
            max_line,
            discarding: false,
        }
    }

    /// Feed one chunk. Returns a result for every complete significant line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<ProgressEvent, StreamError>> {
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        if self.discarding {
            match self.buffer.find('\n') {
                Some(end) => {
                    self.buffer.drain(..=end);
                    self.discarding = false;
                }
                None => {
                    self.buffer.clear();
                    return Vec::new();
                }
            }
        }

        let mut results: Vec<_> = match self.buffer.rfind('\n') {
            Some(last_newline) => {
                let fragment = self.buffer.split_off(last_newline + 1);
                let complete = std::mem::replace(&mut self.buffer, fragment);
                complete.lines().filter_map(parse_line).collect()
            }
            None => Vec::new(),
        };

        if self.buffer.len() > self.max_line {
            self.buffer.clear();
            self.discarding = true;
            results.push(Err(StreamError::LineTooLong {
                limit: self.max_line,
            }));
        }

        results
    }

    /// End of data. Returns the unprocessed trailing fragment, if any.
    pub fn finish(&mut self) -> Option<String> {
        if let Some(tail) = self.utf8.finish() {
            self.buffer.push_str(&tail);
        }
        if self.discarding {
            self.buffer.clear();
            self.discarding = false;
            return None;
        }
        if self.buffer.is_empty() {
            return None;
        }
        let fragment = std::mem::take(&mut self.buffer);
        debug!("Discarding incomplete trailing line: {:?}", fragment);
        Some(fragment)
    }
}

/// `None` for lines without the event prefix
fn parse_line(line: &str) -> Option<Result<ProgressEvent, StreamError>> {
    let payload = line.strip_prefix(EVENT_PREFIX)?;
    Some(ProgressEvent::from_json(payload))
}

/// Reads a response body and yields its events one at a time
pub struct EventConsumer<S> {
    body: S,
    decoder: EventDecoder,
    ready: VecDeque<ProgressEvent>,
    dropped: usize,
    ended: bool,
}

impl<S> EventConsumer<S>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    pub fn new(body: S) -> Self {
        Self {
            body,
            decoder: EventDecoder::new(),
            ready: VecDeque::new(),
            dropped: 0,
            ended: false,
        }
    }

    /// Next event in arrival order. `None` once the body has ended or failed;
    /// deciding what that means is up to the caller.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }
            if self.ended {
                return None;
            }

            match self.body.next().await {
                Some(Ok(chunk)) => {
                    for result in self.decoder.push(&chunk) {
                        match result {
                            Ok(event) => self.ready.push_back(event),
                            Err(e) => {
                                warn!("Dropping stream line: {}", e);
                                self.dropped += 1;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("Event stream read failed: {}", e);
                    self.end();
                }
                None => self.end(),
            }
        }
    }

    /// Number of prefixed lines that could not be parsed
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    fn end(&mut self) {
        self.ended = true;
        self.decoder.finish();
    }
}
