//! Accumulator for streamed audio chunks.
//!
//! Turns `audio_chunk` events into one growing [`AudioBuffer`] and republishes
//! a [`PlayableHandle`] snapshot after every change:
//! - Chunks are stored in an append-only arena keyed by sequence number
//! - Duplicates are dropped, regressions rejected, never corrupting the data
//! - Undecodable payloads cost one chunk, not the session
//! - `complete`/`end` freeze the buffer for good

use crate::signal::{Signal, SignalReporter};
use crate::stream::event::{EventKind, StreamEvent};
use crate::stream::format::{self, AudioFormat};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

const COMPONENT: &str = "accumulator";

/// Chunk payloads shared by a buffer and every snapshot taken from it.
/// Append-only, so the prefix a snapshot covers never changes.
#[derive(Default)]
struct ChunkLog(RwLock<Vec<Bytes>>);

impl ChunkLog {
    fn push(&self, chunk: Bytes) {
        self.0
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(chunk);
    }

    /// Contiguous copy of the first `count` chunks.
    fn join(&self, count: usize, len: usize) -> Bytes {
        let chunks = self.0.read().unwrap_or_else(PoisonError::into_inner);
        if count == 1
            && let Some(only) = chunks.first()
        {
            return only.clone();
        }
        let mut joined = BytesMut::with_capacity(len);
        for chunk in chunks.iter().take(count) {
            joined.extend_from_slice(chunk);
        }
        joined.freeze()
    }
}

/// Immutable snapshot of an audio buffer, ready for a media engine.
///
/// Taking a snapshot costs the same however long the buffer has grown; the
/// audio is only joined into one contiguous block when [`bytes`] is asked
/// for, at most once per snapshot.
///
/// [`bytes`]: PlayableHandle::bytes
#[derive(Clone)]
pub struct PlayableHandle {
    pub version: u64,
    pub format: AudioFormat,
    pub is_final: bool,
    pub decodable: bool,
    pub duration: Option<Duration>,
    log: Arc<ChunkLog>,
    chunks: usize,
    len: usize,
    joined: Arc<OnceLock<Bytes>>,
}

impl PlayableHandle {
    /// Wraps audio that was fetched in one piece, such as a stored page.
    pub fn from_complete(bytes: impl Into<Bytes>, format: AudioFormat) -> Self {
        let bytes = bytes.into();
        let info = format::inspect(format, &bytes);
        let log = ChunkLog::default();
        log.push(bytes.clone());
        Self {
            version: 1,
            format,
            is_final: true,
            decodable: info.decodable,
            duration: info.duration,
            log: Arc::new(log),
            chunks: 1,
            len: bytes.len(),
            joined: Arc::new(OnceLock::from(bytes)),
        }
    }

    /// The audio this snapshot covers, as one contiguous block.
    pub fn bytes(&self) -> Bytes {
        self.joined
            .get_or_init(|| self.log.join(self.chunks, self.len))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }
}

impl fmt::Debug for PlayableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayableHandle")
            .field("version", &self.version)
            .field("len", &self.len)
            .field("format", &self.format)
            .field("is_final", &self.is_final)
            .field("decodable", &self.decodable)
            .field("duration", &self.duration)
            .finish()
    }
}

impl PartialEq for PlayableHandle {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.len == other.len
            && self.format == other.format
            && self.is_final == other.is_final
            && self.decodable == other.decodable
            && self.duration == other.duration
            && self.bytes() == other.bytes()
    }
}

#[derive(Debug, Clone)]
struct ChunkSlot {
    sequence: u64,
    payload: Bytes,
}

/// Audio reassembled from one synthesis session.
pub struct AudioBuffer {
    slots: Vec<ChunkSlot>,
    log: Arc<ChunkLog>,
    /// First bytes of the audio, enough to parse the container header.
    head: Vec<u8>,
    len: usize,
    format: AudioFormat,
    version: u64,
    is_final: bool,
    last_sequence: Option<u64>,
    expected_total: Option<u64>,
    session_id: Option<String>,
    handle: Option<PlayableHandle>,
}

impl AudioBuffer {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            slots: Vec::new(),
            log: Arc::default(),
            head: Vec::new(),
            len: 0,
            format,
            version: 0,
            is_final: false,
            last_sequence: None,
            expected_total: None,
            session_id: None,
            handle: None,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Concatenation of every accepted chunk, in sequence order.
    pub fn bytes(&self) -> Bytes {
        self.handle
            .as_ref()
            .map(PlayableHandle::bytes)
            .unwrap_or_default()
    }

    pub fn chunk_count(&self) -> usize {
        self.slots.len()
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Payload of the chunk accepted with `sequence`.
    pub fn chunk(&self, sequence: u64) -> Option<&[u8]> {
        self.slots
            .binary_search_by_key(&sequence, |slot| slot.sequence)
            .ok()
            .map(|i| &self.slots[i].payload[..])
    }

    /// Total size announced by the producer, if any.
    pub fn expected_total(&self) -> Option<u64> {
        self.expected_total
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Most recently published snapshot.
    pub fn handle(&self) -> Option<&PlayableHandle> {
        self.handle.as_ref()
    }

    fn append(&mut self, sequence: u64, payload: Bytes) {
        let wanted = format::HEADER_BYTES.saturating_sub(self.head.len());
        self.head
            .extend_from_slice(&payload[..wanted.min(payload.len())]);
        self.len += payload.len();
        self.log.push(payload.clone());
        self.slots.push(ChunkSlot { sequence, payload });
        self.last_sequence = Some(sequence);
        self.version += 1;
    }

    fn publish(&mut self) -> PlayableHandle {
        let info = format::inspect_head(self.format, &self.head, self.len);
        let handle = PlayableHandle {
            version: self.version,
            format: self.format,
            is_final: self.is_final,
            decodable: info.decodable,
            duration: info.duration,
            log: Arc::clone(&self.log),
            chunks: self.slots.len(),
            len: self.len,
            joined: Arc::default(),
        };
        self.handle = Some(handle.clone());
        handle
    }
}

// Snapshots keep reading the log they were taken from, so a clone starts a
// log of its own rather than appending to a shared one.
impl Clone for AudioBuffer {
    fn clone(&self) -> Self {
        let log = ChunkLog::default();
        for slot in &self.slots {
            log.push(slot.payload.clone());
        }
        Self {
            slots: self.slots.clone(),
            log: Arc::new(log),
            head: self.head.clone(),
            len: self.len,
            format: self.format,
            version: self.version,
            is_final: self.is_final,
            last_sequence: self.last_sequence,
            expected_total: self.expected_total,
            session_id: self.session_id.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("format", &self.format)
            .field("version", &self.version)
            .field("len", &self.len)
            .field("chunks", &self.slots.len())
            .field("is_final", &self.is_final)
            .field("last_sequence", &self.last_sequence)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Result of feeding one event to the accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Audio was appended; carries the republished snapshot.
    Updated(PlayableHandle),
    /// The buffer became final; carries the last snapshot.
    Finalized(PlayableHandle),
    /// Accepted without changing the audio (start, heartbeat, empty chunk).
    Unchanged,
    /// The event was dropped; the signal says why.
    Dropped(Signal),
    /// The producer reported a synthesis failure.
    Failed(String),
}

impl IngestOutcome {
    /// Snapshot published by this ingest, if any.
    pub fn handle(&self) -> Option<&PlayableHandle> {
        match self {
            IngestOutcome::Updated(h) | IngestOutcome::Finalized(h) => Some(h),
            _ => None,
        }
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub duplicates: u64,
    pub regressions: u64,
    pub decode_failures: u64,
    pub after_final: u64,
}

/// Builds an [`AudioBuffer`] from stream events.
pub struct AudioChunkAccumulator {
    buffer: AudioBuffer,
    stats: IngestStats,
    reporter: Arc<dyn SignalReporter>,
}

impl AudioChunkAccumulator {
    pub fn new(format: AudioFormat, reporter: Arc<dyn SignalReporter>) -> Self {
        Self {
            buffer: AudioBuffer::new(format),
            stats: IngestStats::default(),
            reporter,
        }
    }

    pub fn buffer(&self) -> &AudioBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> AudioBuffer {
        self.buffer
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    /// Feeds one event.
    pub fn ingest(&mut self, event: &StreamEvent) -> IngestOutcome {
        if let Some(total) = event.total_size_hint {
            self.buffer.expected_total = Some(total);
        }

        match event.kind {
            EventKind::Start => {
                if self.buffer.session_id.is_none() {
                    self.buffer.session_id = event.session_id.clone();
                }
                IngestOutcome::Unchanged
            }
            EventKind::AudioChunk => self.ingest_chunk(event),
            EventKind::Complete | EventKind::End => self.finalize(),
            EventKind::Error => IngestOutcome::Failed(
                event
                    .error
                    .clone()
                    .or_else(|| event.message.clone())
                    .unwrap_or_else(|| "unknown synthesis error".to_string()),
            ),
            EventKind::Heartbeat | EventKind::Unknown => IngestOutcome::Unchanged,
        }
    }

    fn ingest_chunk(&mut self, event: &StreamEvent) -> IngestOutcome {
        let sequence = event
            .sequence
            .unwrap_or_else(|| self.buffer.last_sequence.map_or(1, |last| last + 1));

        if self.buffer.is_final {
            self.stats.after_final += 1;
            return self.drop_with(Signal::ChunkAfterFinal { sequence });
        }

        if let (Some(expected), Some(actual)) = (&self.buffer.session_id, &event.session_id)
            && expected != actual
        {
            return self.drop_with(Signal::MalformedRecord {
                reason: format!("chunk {sequence} belongs to session {actual}, not {expected}"),
            });
        }

        if let Some(last) = self.buffer.last_sequence {
            if sequence == last {
                self.stats.duplicates += 1;
                return self.drop_with(Signal::DuplicateChunk { sequence });
            }
            if sequence < last {
                self.stats.regressions += 1;
                return self.drop_with(Signal::SequenceRegression { sequence, last });
            }
            if sequence > last + 1 {
                tracing::debug!(
                    component = COMPONENT,
                    "gap before chunk {sequence}, last accepted was {last}"
                );
            }
        }

        let decoded = match event.payload.as_deref() {
            Some(payload) => BASE64.decode(payload.trim()),
            None => {
                self.stats.decode_failures += 1;
                return self.drop_with(Signal::DecodeFailed {
                    sequence,
                    reason: "missing payload".to_string(),
                });
            }
        };

        let payload = match decoded {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.decode_failures += 1;
                return self.drop_with(Signal::DecodeFailed {
                    sequence,
                    reason: e.to_string(),
                });
            }
        };

        if payload.is_empty() {
            self.buffer.last_sequence = Some(sequence);
            return IngestOutcome::Unchanged;
        }

        self.buffer.append(sequence, Bytes::from(payload));
        self.stats.accepted += 1;
        IngestOutcome::Updated(self.buffer.publish())
    }

    fn finalize(&mut self) -> IngestOutcome {
        if self.buffer.is_final {
            return IngestOutcome::Unchanged;
        }
        self.buffer.is_final = true;
        self.buffer.version += 1;
        IngestOutcome::Finalized(self.buffer.publish())
    }

    fn drop_with(&self, signal: Signal) -> IngestOutcome {
        self.reporter.report(COMPONENT, &signal);
        IngestOutcome::Dropped(signal)
    }
}
