//! Playback of growing audio buffers.
//!
//! The [`PlaybackController`] owns one [`MediaEngine`] and is the only thing
//! that touches it. Buffer snapshots arrive as
//! [`PlayableHandle`](crate::stream::PlayableHandle)s; each newer version
//! replaces the live resource in place.

pub mod clock;
pub mod controller;
pub mod engine;

pub use clock::ClockEngine;
pub use controller::{
    BufferUpdate, PlayOutcome, PlaybackController, PlaybackEvent, PlaybackSession, PlaybackState,
};
pub use engine::{MediaEngine, MockMediaEngine, PlayRejected};
