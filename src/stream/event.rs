//! Event types carried by the synthesis stream.
//!
//! Every record of the stream deserializes into one [`StreamEvent`]. The
//! audio payload stays base64 text here; decoding belongs to the accumulator
//! so that one bad payload costs one chunk, not the record parser.

use serde::{Deserialize, Serialize};

/// Kind of a stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Synthesis accepted; carries session metadata.
    Start,
    /// One chunk of encoded audio.
    AudioChunk,
    /// Synthesis finished successfully.
    Complete,
    /// Synthesis failed on the server.
    Error,
    /// Stream is about to close.
    End,
    /// Keep-alive sent while the provider is slow.
    Heartbeat,
    /// Anything this client does not know about.
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Returns true for kinds that end the stream.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Complete | EventKind::Error | EventKind::End)
    }
}

/// One decoded stream record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Chunk counter assigned by the producer, starting at 1.
    #[serde(default, rename = "chunk_count")]
    pub sequence: Option<u64>,
    /// Base64 audio on `audio_chunk` records.
    #[serde(default, rename = "data")]
    pub payload: Option<String>,
    /// Total bytes synthesized so far, as reported by the producer.
    #[serde(default, rename = "total_size")]
    pub total_size_hint: Option<u64>,
    #[serde(default)]
    pub is_final: bool,
    /// Human-readable note on `complete` records.
    #[serde(default)]
    pub message: Option<String>,
    /// Failure text on `error` records.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub text_length: Option<u64>,
}

impl StreamEvent {
    /// Creates an event of the given kind with every optional field empty.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            session_id: None,
            sequence: None,
            payload: None,
            total_size_hint: None,
            is_final: false,
            message: None,
            error: None,
            provider: None,
            voice: None,
            text_length: None,
        }
    }

    /// Creates an `audio_chunk` event carrying base64 `payload`.
    pub fn audio_chunk(sequence: u64, payload: impl Into<String>) -> Self {
        Self {
            sequence: Some(sequence),
            payload: Some(payload.into()),
            ..Self::new(EventKind::AudioChunk)
        }
    }

    /// Deserialize an event from a JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize the event to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}
