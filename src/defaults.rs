//! Default configuration constants for narrastream.
//!
//! Shared between the configuration types and the pipeline components so the
//! two never drift apart.

/// Default backend base URL.
pub const BASE_URL: &str = "http://127.0.0.1:8000";

/// Default HTTP request timeout for non-streaming calls, in seconds.
///
/// Streaming synthesis responses are long-lived and are not subject to it.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Marker that prefixes every record of the synthesis stream.
pub const RECORD_MARKER: &str = "data:";

/// Largest single record the frame parser will buffer before discarding it.
///
/// One base64 chunk of a few hundred milliseconds of WAV audio is well under
/// this; anything larger is a broken producer.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

/// Default speech synthesis provider.
pub const DEFAULT_PROVIDER: &str = "baidu";

/// Default synthesis language.
pub const DEFAULT_LANGUAGE: &str = "zh";

/// Default synthesis output format.
pub const DEFAULT_FORMAT: &str = "wav";

/// Maximum characters accepted for one synthesis request.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Accepted range for speed, pitch and volume ratios.
pub const MIN_PROSODY: f32 = 0.5;
pub const MAX_PROSODY: f32 = 2.0;

/// Minimum buffered audio before auto-start, in milliseconds.
///
/// Zero starts on the first decodable buffer version.
pub const MIN_BUFFERED_MS: u64 = 0;

/// Playback bookkeeping tick, in milliseconds.
pub const PLAYBACK_TICK_MS: u64 = 50;

/// Longest time the sequencer waits for an unready segment, in milliseconds.
pub const SEGMENT_MAX_WAIT_MS: u64 = 10_000;

/// First backoff step while waiting for a segment, in milliseconds.
pub const SEGMENT_INITIAL_BACKOFF_MS: u64 = 100;

/// Backoff ceiling while waiting for a segment, in milliseconds.
pub const SEGMENT_MAX_BACKOFF_MS: u64 = 1_000;

/// Narration job status poll interval, in milliseconds.
pub const NARRATION_POLL_INTERVAL_MS: u64 = 2_000;

/// Narration job deadline, in milliseconds.
pub const NARRATION_TIMEOUT_MS: u64 = 300_000;

/// Default narration style sent with generation requests.
pub const NARRATION_STYLE: &str = "讲解";

/// Byte rate assumed for compressed formats whose duration cannot be measured.
///
/// 128 kbit/s, the common MP3 rate of the synthesis providers.
pub const COMPRESSED_BYTES_PER_SEC: u64 = 16_000;

/// Sample rate assumed for headerless PCM payloads.
pub const PCM_SAMPLE_RATE: u32 = 16_000;
