//! Frame parser for the synthesis stream.
//!
//! The server writes one record per line, `data: {json}`, separated by blank
//! lines. Network reads split those lines arbitrarily, so bytes are buffered
//! until a newline arrives and only complete lines are decoded.

use crate::defaults;
use crate::error::{NarraError, Result};
use crate::signal::{Signal, SignalReporter};
use crate::stream::event::{EventKind, StreamEvent};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

const COMPONENT: &str = "parser";

/// SSE field names that carry no payload for this protocol.
const IGNORED_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Push-based record splitter.
pub struct FrameParser {
    buffer: Vec<u8>,
    /// Set while skipping the tail of an oversized record.
    discarding: bool,
    max_record_bytes: usize,
    records: u64,
    reporter: Arc<dyn SignalReporter>,
}

impl FrameParser {
    pub fn new(reporter: Arc<dyn SignalReporter>) -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
            max_record_bytes: defaults::MAX_RECORD_BYTES,
            records: 0,
            reporter,
        }
    }

    /// Overrides the size limit for a single record.
    pub fn with_max_record_bytes(mut self, max: usize) -> Self {
        self.max_record_bytes = max;
        self
    }

    /// Number of complete lines carrying a record seen so far.
    pub fn records_seen(&self) -> u64 {
        self.records
    }

    /// Bytes buffered for a record whose newline has not arrived yet.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds one network read and returns the events it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut rest = bytes;

        while !rest.is_empty() {
            match rest.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    let head = &rest[..pos];
                    rest = &rest[pos + 1..];

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }

                    self.buffer.extend_from_slice(head);
                    if self.buffer.len() > self.max_record_bytes {
                        self.reject_oversized();
                        self.discarding = false;
                        continue;
                    }

                    let line = std::mem::take(&mut self.buffer);
                    if let Some(event) = self.parse_line(&line) {
                        events.push(event);
                    }
                }
                None => {
                    if !self.discarding {
                        self.buffer.extend_from_slice(rest);
                        if self.buffer.len() > self.max_record_bytes {
                            self.reject_oversized();
                        }
                    }
                    break;
                }
            }
        }

        events
    }

    /// Signals end of input. Any unterminated record is reported and dropped.
    pub fn finish(&mut self) {
        let leftover = std::mem::take(&mut self.buffer);
        let meaningful = leftover.iter().any(|b| !b.is_ascii_whitespace());
        if meaningful {
            self.reporter.report(
                COMPONENT,
                &Signal::TruncatedRecord {
                    bytes: leftover.len(),
                },
            );
        }
        self.discarding = false;
    }

    fn reject_oversized(&mut self) {
        self.reporter.report(
            COMPONENT,
            &Signal::OversizedRecord {
                bytes: self.buffer.len(),
            },
        );
        self.buffer.clear();
        self.discarding = true;
    }

    fn parse_line(&mut self, line: &[u8]) -> Option<StreamEvent> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let text = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(e) => {
                self.malformed(format!("record is not UTF-8: {e}"));
                return None;
            }
        };

        if text.is_empty() || text.starts_with(':') {
            return None;
        }

        let Some(body) = text.strip_prefix(defaults::RECORD_MARKER) else {
            if !IGNORED_FIELDS.iter().any(|field| text.starts_with(field)) {
                self.malformed(format!("missing '{}' marker", defaults::RECORD_MARKER));
            }
            return None;
        };

        self.records += 1;
        match StreamEvent::from_json(body.trim_start()) {
            Ok(event) if event.kind == EventKind::Unknown => {
                let kind = serde_json::from_str::<serde_json::Value>(body.trim_start())
                    .ok()
                    .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(str::to_string))
                    .unwrap_or_default();
                self.reporter
                    .report(COMPONENT, &Signal::UnknownEvent { kind });
                None
            }
            Ok(event) => Some(event),
            Err(e) => {
                self.malformed(e.to_string());
                None
            }
        }
    }

    fn malformed(&self, reason: String) {
        self.reporter
            .report(COMPONENT, &Signal::MalformedRecord { reason });
    }
}

/// Pulls events out of a byte stream, one session at a time.
///
/// Iteration ends after the first terminal event (`complete`, `error`,
/// `end`). A source that closes before one arrives yields
/// [`NarraError::StreamTruncated`].
pub struct EventReader<S> {
    source: S,
    parser: FrameParser,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S, E> EventReader<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    pub fn new(source: S, parser: FrameParser) -> Self {
        Self {
            source,
            parser,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Returns true once a terminal event or error has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits for the next event.
    ///
    /// Returns `Ok(None)` once iteration is over.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    self.finished = true;
                    self.pending.clear();
                }
                return Ok(Some(event));
            }

            match self.source.next().await {
                Some(Ok(bytes)) => {
                    let events = self.parser.push(&bytes);
                    self.pending.extend(events);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(NarraError::Transport {
                        message: format!("stream read failed: {e}"),
                    });
                }
                None => {
                    self.parser.finish();
                    self.finished = true;
                    return Err(NarraError::StreamTruncated {
                        records: self.parser.records_seen(),
                    });
                }
            }
        }
    }

    /// Converts the reader into a `Stream` of events.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent>> {
        futures_util::stream::unfold(self, |mut reader| async move {
            match reader.next_event().await {
                Ok(Some(event)) => Some((Ok(event), reader)),
                Ok(None) => None,
                Err(e) => Some((Err(e), reader)),
            }
        })
    }
}
