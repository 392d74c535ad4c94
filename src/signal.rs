//! Non-fatal conditions raised while ingesting a synthesis stream.
//!
//! Malformed records, undecodable chunks and ordering violations are not
//! errors: the pipeline drops the offending unit and keeps going. They are
//! reported here so callers can log, count or assert on them.

use std::fmt;
use std::sync::{Arc, Mutex};

/// A recoverable condition observed by a pipeline component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A record could not be parsed and was skipped.
    MalformedRecord { reason: String },
    /// A record had an event type this client does not understand.
    UnknownEvent { kind: String },
    /// A record exceeded the parser's size limit and was discarded.
    OversizedRecord { bytes: usize },
    /// Bytes left over when the stream closed, without a terminating newline.
    TruncatedRecord { bytes: usize },
    /// A chunk payload failed to decode and was dropped.
    DecodeFailed { sequence: u64, reason: String },
    /// A chunk repeated the last accepted sequence number.
    DuplicateChunk { sequence: u64 },
    /// A chunk arrived with a sequence number below the last accepted one.
    SequenceRegression { sequence: u64, last: u64 },
    /// A chunk arrived after the buffer was finalized.
    ChunkAfterFinal { sequence: u64 },
}

impl Signal {
    /// Returns true for conditions that indicate lost or rejected audio.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Signal::DecodeFailed { .. }
                | Signal::SequenceRegression { .. }
                | Signal::ChunkAfterFinal { .. }
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::MalformedRecord { reason } => write!(f, "malformed record skipped: {reason}"),
            Signal::UnknownEvent { kind } => write!(f, "unknown event type '{kind}' skipped"),
            Signal::OversizedRecord { bytes } => {
                write!(f, "oversized record discarded ({bytes} bytes)")
            }
            Signal::TruncatedRecord { bytes } => {
                write!(f, "incomplete trailing record dropped ({bytes} bytes)")
            }
            Signal::DecodeFailed { sequence, reason } => {
                write!(f, "chunk {sequence} dropped, payload did not decode: {reason}")
            }
            Signal::DuplicateChunk { sequence } => write!(f, "duplicate chunk {sequence} ignored"),
            Signal::SequenceRegression { sequence, last } => {
                write!(f, "chunk {sequence} rejected, last accepted was {last}")
            }
            Signal::ChunkAfterFinal { sequence } => {
                write!(f, "chunk {sequence} rejected, buffer already final")
            }
        }
    }
}

/// Trait for reporting pipeline signals.
pub trait SignalReporter: Send + Sync {
    /// Reports a signal raised by a component.
    fn report(&self, component: &str, signal: &Signal);
}

/// Reporter that forwards signals to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl SignalReporter for TracingReporter {
    fn report(&self, component: &str, signal: &Signal) {
        match signal {
            Signal::DuplicateChunk { .. } => tracing::debug!(component, "{signal}"),
            s if s.is_error() => tracing::error!(component, "{signal}"),
            _ => tracing::warn!(component, "{signal}"),
        }
    }
}

/// Reporter that keeps every signal, for tests and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CollectingReporter {
    signals: Arc<Mutex<Vec<Signal>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the signals reported so far.
    pub fn signals(&self) -> Vec<Signal> {
        match self.signals.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl SignalReporter for CollectingReporter {
    fn report(&self, _component: &str, signal: &Signal) {
        match self.signals.lock() {
            Ok(mut guard) => guard.push(signal.clone()),
            Err(poisoned) => poisoned.into_inner().push(signal.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        let regression = Signal::SequenceRegression {
            sequence: 2,
            last: 5,
        };
        assert_eq!(
            regression.to_string(),
            "chunk 2 rejected, last accepted was 5"
        );

        let duplicate = Signal::DuplicateChunk { sequence: 1 };
        assert_eq!(duplicate.to_string(), "duplicate chunk 1 ignored");
    }

    #[test]
    fn test_error_classification() {
        assert!(Signal::SequenceRegression { sequence: 1, last: 2 }.is_error());
        assert!(
            Signal::DecodeFailed {
                sequence: 3,
                reason: "bad base64".to_string()
            }
            .is_error()
        );
        assert!(!Signal::DuplicateChunk { sequence: 1 }.is_error());
        assert!(
            !Signal::MalformedRecord {
                reason: "x".to_string()
            }
            .is_error()
        );
    }

    #[test]
    fn test_tracing_reporter_does_not_panic() {
        let reporter = TracingReporter;
        reporter.report("parser", &Signal::TruncatedRecord { bytes: 12 });
        reporter.report("accumulator", &Signal::DuplicateChunk { sequence: 4 });
    }

    #[test]
    fn test_collecting_reporter_keeps_order() {
        let reporter = CollectingReporter::new();
        reporter.report("a", &Signal::DuplicateChunk { sequence: 1 });
        reporter.report("b", &Signal::OversizedRecord { bytes: 99 });

        assert_eq!(
            reporter.signals(),
            vec![
                Signal::DuplicateChunk { sequence: 1 },
                Signal::OversizedRecord { bytes: 99 },
            ]
        );
    }

    #[test]
    fn test_collecting_reporter_clones_share_storage() {
        let reporter = CollectingReporter::new();
        let clone = reporter.clone();
        clone.report("c", &Signal::ChunkAfterFinal { sequence: 9 });
        assert_eq!(reporter.signals().len(), 1);
    }
}
