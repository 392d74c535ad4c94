//! Media engine that renders nothing and only keeps time.
//!
//! Used by the CLI to drive sequencing without an audio device, and by tests
//! under a paused tokio clock.

use super::engine::{MediaEngine, PlayRejected};
use crate::error::{NarraError, Result};
use crate::stream::PlayableHandle;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct ClockEngine {
    duration: Option<Duration>,
    offset: Duration,
    started_at: Option<Instant>,
    loaded: bool,
}

impl ClockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn raw_position(&self) -> Duration {
        match self.started_at {
            Some(started) => self.offset + started.elapsed(),
            None => self.offset,
        }
    }
}

#[async_trait]
impl MediaEngine for ClockEngine {
    fn load(&mut self, handle: &PlayableHandle) -> Result<()> {
        if !handle.decodable {
            return Err(NarraError::Engine {
                message: format!("buffer version {} is not decodable", handle.version),
            });
        }
        self.duration = handle.duration;
        self.offset = Duration::ZERO;
        self.started_at = None;
        self.loaded = true;
        Ok(())
    }

    async fn play(&mut self) -> std::result::Result<(), PlayRejected> {
        if !self.loaded {
            return Err(PlayRejected {
                reason: "nothing loaded".to_string(),
            });
        }
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.offset = self.position();
        self.started_at = None;
    }

    fn seek(&mut self, position: Duration) {
        self.offset = match self.duration {
            Some(end) => position.min(end),
            None => position,
        };
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }

    fn position(&self) -> Duration {
        let raw = self.raw_position();
        match self.duration {
            Some(end) => raw.min(end),
            None => raw,
        }
    }

    fn is_ended(&self) -> bool {
        self.loaded && self.duration.is_some_and(|end| self.raw_position() >= end)
    }

    fn release(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::AudioFormat;

    fn two_seconds() -> PlayableHandle {
        PlayableHandle::from_complete(vec![0u8; 32_000], AudioFormat::Mp3)
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_while_playing() {
        let mut engine = ClockEngine::new();
        engine.load(&two_seconds()).unwrap();
        engine.play().await.unwrap();

        tokio::time::sleep(Duration::from_millis(750)).await;
        assert_eq!(engine.position(), Duration::from_millis(750));
        assert!(!engine.is_ended());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(engine.position(), Duration::from_secs(2));
        assert!(engine.is_ended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_position() {
        let mut engine = ClockEngine::new();
        engine.load(&two_seconds()).unwrap();
        engine.play().await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        engine.pause();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.position(), Duration::from_millis(300));
        assert!(!engine.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_while_playing_continues_from_target() {
        let mut engine = ClockEngine::new();
        engine.load(&two_seconds()).unwrap();
        engine.play().await.unwrap();

        engine.seek(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(engine.position(), Duration::from_millis(1_250));
    }

    #[tokio::test]
    async fn test_play_requires_load() {
        let mut engine = ClockEngine::new();
        assert!(engine.play().await.is_err());
    }

    #[test]
    fn test_undecodable_handle_fails_to_load() {
        let mut engine = ClockEngine::new();
        let handle = PlayableHandle::from_complete(Vec::new(), AudioFormat::Wav);
        assert!(engine.load(&handle).is_err());
    }

    #[test]
    fn test_release_resets() {
        let mut engine = ClockEngine::new();
        engine.load(&two_seconds()).unwrap();
        engine.seek(Duration::from_secs(1));
        engine.release();
        assert_eq!(engine.position(), Duration::ZERO);
        assert!(!engine.is_ended());
    }
}
