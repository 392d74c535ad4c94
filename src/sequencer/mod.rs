//! Ordered playback across independently produced segments.
//!
//! ```text
//!  producers ──publish──▶ SegmentTable ◀──poll (backoff)── SegmentSequencer
//!                                                              │
//!                                           commands ─────────▶│──▶ PlaybackController
//!                                                              │
//!                                                              └──▶ SequencerEvent
//! ```

pub mod driver;
pub mod segment;

pub use driver::{
    SegmentSequencer, SequenceReport, SequencerCommand, SequencerEvent, UnavailableReason,
};
pub use segment::{Segment, SegmentStatus, SegmentTable};
