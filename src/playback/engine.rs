use crate::error::{NarraError, Result};
use crate::stream::PlayableHandle;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// The engine refused to start playback (autoplay policy, device busy).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("playback rejected: {reason}")]
pub struct PlayRejected {
    pub reason: String,
}

/// Trait for media engines that render a [`PlayableHandle`].
///
/// An engine holds at most one loaded media resource. The
/// [`PlaybackController`](super::PlaybackController) is the only caller.
#[async_trait]
pub trait MediaEngine: Send {
    /// Load `handle` as the current media resource, positioned at zero.
    fn load(&mut self, handle: &PlayableHandle) -> Result<()>;

    /// Start or resume rendering the loaded resource.
    ///
    /// Resolves once the engine acknowledges the start.
    async fn play(&mut self) -> std::result::Result<(), PlayRejected>;

    fn pause(&mut self);

    fn seek(&mut self, position: Duration);

    /// Current render position within the loaded resource.
    fn position(&self) -> Duration;

    /// Returns true once the position reached the end of the loaded resource.
    fn is_ended(&self) -> bool;

    /// Drop the loaded resource, if any.
    fn release(&mut self);
}

#[derive(Debug, Default)]
struct MockState {
    loaded: Option<PlayableHandle>,
    playing: bool,
    position: Duration,
    history: Vec<PlayableHandle>,
    releases: usize,
    max_active: usize,
    rejections_left: usize,
    fail_load: bool,
    instant_playback: bool,
}

/// Mock media engine for testing.
///
/// Clones share state, so a test can keep one clone for inspection while the
/// controller owns the other.
#[derive(Debug, Clone, Default)]
pub struct MockMediaEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockMediaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` play requests.
    pub fn with_play_rejections(self, count: usize) -> Self {
        self.lock().rejections_left = count;
        self
    }

    /// Fail every load.
    pub fn with_load_failure(self) -> Self {
        self.lock().fail_load = true;
        self
    }

    /// Jump to the end of the resource as soon as playback starts.
    pub fn with_instant_playback(self) -> Self {
        self.lock().instant_playback = true;
        self
    }

    /// Advance the render position while playing, capped at the resource end.
    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        if state.playing {
            let end = state
                .loaded
                .as_ref()
                .and_then(|h| h.duration)
                .unwrap_or(Duration::MAX);
            state.position = state.position.saturating_add(by).min(end);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.lock().playing
    }

    pub fn loaded_version(&self) -> Option<u64> {
        self.lock().loaded.as_ref().map(|h| h.version)
    }

    /// Every handle loaded so far, in load order.
    pub fn history(&self) -> Vec<PlayableHandle> {
        self.lock().history.clone()
    }

    pub fn load_count(&self) -> usize {
        self.lock().history.len()
    }

    pub fn release_count(&self) -> usize {
        self.lock().releases
    }

    /// Highest number of simultaneously loaded resources observed.
    pub fn max_active(&self) -> usize {
        self.lock().max_active
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl MediaEngine for MockMediaEngine {
    fn load(&mut self, handle: &PlayableHandle) -> Result<()> {
        let mut state = self.lock();
        if state.fail_load {
            return Err(NarraError::Engine {
                message: "mock load failure".to_string(),
            });
        }
        let active = usize::from(state.loaded.is_some()) + 1;
        state.max_active = state.max_active.max(active);
        state.loaded = Some(handle.clone());
        state.history.push(handle.clone());
        state.position = Duration::ZERO;
        state.playing = false;
        Ok(())
    }

    async fn play(&mut self) -> std::result::Result<(), PlayRejected> {
        let mut state = self.lock();
        if state.rejections_left > 0 {
            state.rejections_left -= 1;
            return Err(PlayRejected {
                reason: "mock rejection".to_string(),
            });
        }
        if state.loaded.is_none() {
            return Err(PlayRejected {
                reason: "nothing loaded".to_string(),
            });
        }
        state.playing = true;
        if state.instant_playback
            && let Some(end) = state.loaded.as_ref().and_then(|h| h.duration)
        {
            state.position = end;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.lock().playing = false;
    }

    fn seek(&mut self, position: Duration) {
        self.lock().position = position;
    }

    fn position(&self) -> Duration {
        self.lock().position
    }

    fn is_ended(&self) -> bool {
        let state = self.lock();
        match state.loaded.as_ref().and_then(|h| h.duration) {
            Some(end) => state.position >= end,
            None => false,
        }
    }

    fn release(&mut self) {
        let mut state = self.lock();
        if state.loaded.take().is_some() {
            state.releases += 1;
        }
        state.playing = false;
        state.position = Duration::ZERO;
    }
}
