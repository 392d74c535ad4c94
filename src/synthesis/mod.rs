//! Live text-to-speech over the streaming synthesis endpoint.

pub mod client;
pub mod request;
pub mod session;

pub use client::{ByteStream, SynthesisClient};
pub use request::SynthesisRequest;
pub use session::{
    LiveSynthesis, SessionHandle, SessionSummary, play_session, run_session,
};
