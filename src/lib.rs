//! narrastream - Streaming speech synthesis and narrated playback
//!
//! Reassembles synthesis audio streamed as server-sent events into a
//! playable buffer, plays it while it grows, and sequences per-page
//! narration audio produced by a remote generation job.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod narration;
pub mod playback;
pub mod sequencer;
pub mod signal;
pub mod stream;
pub mod synthesis;

// Composition root - needs everything
#[cfg(feature = "cli")]
pub mod app;

// Stream ingestion
pub use stream::{
    AudioBuffer, AudioChunkAccumulator, AudioFormat, EventKind, EventReader, FrameParser,
    IngestOutcome, PlayableHandle, StreamEvent,
};

// Playback
pub use playback::{ClockEngine, MediaEngine, PlaybackController, PlaybackState};

// Sequencing
pub use sequencer::{SegmentSequencer, SegmentTable, SequencerCommand, SequencerEvent};

// Remote services
pub use narration::{HttpNarrationApi, NarrationJobMonitor, NarrationWorkflow};
pub use synthesis::{LiveSynthesis, SynthesisClient, SynthesisRequest};

// Error handling
pub use error::{NarraError, Result};

// Config
pub use config::Config;

// Diagnostics
pub use signal::{Signal, SignalReporter, TracingReporter};

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_short_hash_when_present() {
        let ver = version_string();
        match option_env!("GIT_HASH") {
            Some(hash) if !hash.is_empty() => assert_eq!(ver.split('+').nth(1), Some(hash)),
            _ => assert_eq!(ver, env!("CARGO_PKG_VERSION")),
        }
    }
}
