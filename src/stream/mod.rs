//! Ingestion side of a synthesis stream.
//!
//! ```text
//! ┌──────────┐ bytes ┌─────────────┐ events ┌─────────────┐ handles ┌────────────┐
//! │  HTTP    │──────▶│ FrameParser │───────▶│ Accumulator │────────▶│ Playback   │
//! │  body    │       │ (records)   │        │ (versioned) │         │ controller │
//! └──────────┘       └─────────────┘        └─────────────┘         └────────────┘
//!                          │                       │
//!                          └────── signals ────────┘
//!                            (malformed, duplicate,
//!                             regression, decode)
//! ```

pub mod accumulator;
pub mod event;
pub mod format;
pub mod parser;

pub use accumulator::{
    AudioBuffer, AudioChunkAccumulator, IngestOutcome, IngestStats, PlayableHandle,
};
pub use event::{EventKind, StreamEvent};
pub use format::{AudioFormat, AudioInfo};
pub use parser::{EventReader, FrameParser};
