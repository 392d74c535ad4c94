//! Document narration: per-page audio generated by a backend job.
//!
//! The [`SlideConversionMonitor`] holds generation back until the slides are
//! converted, the [`NarrationJobMonitor`] gates playback on the job's
//! readiness, and the [`NarrationWorkflow`] then feeds downloaded pages to a
//! [`SegmentSequencer`](crate::sequencer::SegmentSequencer).

pub mod api;
pub mod monitor;
pub mod workflow;

pub use api::{
    AudioFile, GenerationSummary, HttpNarrationApi, NarrationRequest, NarrationStatus,
    VoiceSettings, slide_image_filename,
};
pub use monitor::{
    ConversionCheck, JobStatusCheck, NarrationJobMonitor, ScriptedPoll, ScriptedStatusCheck,
    SlideConversionMonitor,
};
pub use workflow::{NarrationOptions, NarrationWorkflow, PreparedNarration};
