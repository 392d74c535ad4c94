//! Single owner of the live playback session.
//!
//! State machine:
//! ```text
//! idle ──▶ streaming ──▶ ready ──▶ playing ◀──▶ paused
//!             │            │          │  ▲
//!             └────────────┴──▶ deferred ┘      playing ──(end of final)──▶ stopped
//! ```
//! `stop()` returns to idle from anywhere. Load failures land in `error`.

use super::engine::MediaEngine;
use crate::config::PlaybackConfig;
use crate::stream::PlayableHandle;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    /// Buffer still growing; playable if decodable.
    Streaming,
    /// Buffer final and decodable, not started.
    Ready,
    Playing,
    Paused,
    /// The engine refused to start; a later `play()` retries.
    Deferred,
    /// Reached the end of a final buffer.
    Stopped,
    /// The engine failed to load the buffer.
    Error,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Streaming => "streaming",
            PlaybackState::Ready => "ready",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Deferred => "deferred",
            PlaybackState::Stopped => "stopped",
            PlaybackState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Result of a `play()` request. Never an error: every case is recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    AlreadyPlaying,
    /// No decodable audio yet.
    NotReady,
    /// The engine refused; retry on explicit user action.
    Deferred(String),
    /// The engine could not load the buffer.
    Failed(String),
}

/// What the controller did with a new buffer version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferUpdate {
    /// Version not newer than the current one.
    Stale,
    /// Stored, but nothing decodable to play yet.
    Pending,
    /// Stored for a later `play()`.
    Staged,
    /// Replaced the live resource at `position`.
    Swapped { position: Duration },
    /// Stored and auto-started.
    AutoStarted(PlayOutcome),
    /// The engine could not load the new version.
    Failed(String),
}

/// Notification raised by [`PlaybackController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Reached the end of a final buffer.
    Ended { segment: Option<usize> },
    /// Caught up with a buffer that is still growing.
    Stalled {
        segment: Option<usize>,
        position: Duration,
    },
}

/// Snapshot of the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSession {
    pub id: u64,
    pub segment: Option<usize>,
    pub version: Option<u64>,
    pub state: PlaybackState,
    pub position: Duration,
}

pub struct PlaybackController<E: MediaEngine> {
    engine: E,
    state: PlaybackState,
    session_id: u64,
    segment: Option<usize>,
    current: Option<PlayableHandle>,
    loaded_version: Option<u64>,
    auto_start: bool,
    auto_started: bool,
    min_buffered: Duration,
    stalled: bool,
}

impl<E: MediaEngine> PlaybackController<E> {
    pub fn new(engine: E, config: &PlaybackConfig) -> Self {
        Self {
            engine,
            state: PlaybackState::Idle,
            session_id: 0,
            segment: None,
            current: None,
            loaded_version: None,
            auto_start: config.auto_start,
            auto_started: false,
            min_buffered: config.min_buffered(),
            stalled: false,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn segment(&self) -> Option<usize> {
        self.segment
    }

    /// Version of the newest buffer received in this session.
    pub fn version(&self) -> Option<u64> {
        self.current.as_ref().map(|h| h.version)
    }

    pub fn position(&self) -> Duration {
        if self.loaded_version.is_some() {
            self.engine.position()
        } else {
            Duration::ZERO
        }
    }

    pub fn session(&self) -> PlaybackSession {
        PlaybackSession {
            id: self.session_id,
            segment: self.segment,
            version: self.version(),
            state: self.state,
            position: self.position(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Tear down the current session and open a new one.
    pub fn begin(&mut self, segment: Option<usize>) -> u64 {
        self.stop();
        self.session_id += 1;
        self.segment = segment;
        tracing::debug!(
            "playback session {} opened (segment {:?})",
            self.session_id,
            segment
        );
        self.session_id
    }

    /// Accept a new snapshot of the session's buffer.
    pub async fn on_buffer(&mut self, handle: PlayableHandle) -> BufferUpdate {
        if let Some(current) = &self.current
            && handle.version <= current.version
        {
            tracing::debug!(
                "ignoring stale buffer version {} (have {})",
                handle.version,
                current.version
            );
            return BufferUpdate::Stale;
        }

        let decodable = handle.decodable;
        let buffered = handle.duration.unwrap_or_default();
        let is_final = handle.is_final;
        self.current = Some(handle);

        if !decodable {
            if self.state == PlaybackState::Idle {
                self.state = PlaybackState::Streaming;
            }
            return BufferUpdate::Pending;
        }

        match self.state {
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Deferred
                if self.loaded_version.is_some() =>
            {
                self.swap().await
            }
            PlaybackState::Stopped => BufferUpdate::Staged,
            _ => {
                self.state = if is_final {
                    PlaybackState::Ready
                } else {
                    PlaybackState::Streaming
                };
                if self.auto_start
                    && !self.auto_started
                    && (buffered >= self.min_buffered || is_final)
                {
                    self.auto_started = true;
                    BufferUpdate::AutoStarted(self.play().await)
                } else {
                    BufferUpdate::Staged
                }
            }
        }
    }

    /// Accept a snapshot like [`on_buffer`](Self::on_buffer) but never
    /// auto-start this session; playback waits for an explicit `play()`.
    pub async fn stage(&mut self, handle: PlayableHandle) -> BufferUpdate {
        self.auto_started = true;
        self.on_buffer(handle).await
    }

    /// Replace the loaded resource with the current handle, keeping position.
    async fn swap(&mut self) -> BufferUpdate {
        let Some(handle) = self.current.clone() else {
            return BufferUpdate::Pending;
        };
        let position = self.engine.position();
        let resume = self.state == PlaybackState::Playing;

        self.engine.release();
        self.loaded_version = None;
        if let Err(e) = self.engine.load(&handle) {
            tracing::error!("failed to load buffer version {}: {e}", handle.version);
            self.state = PlaybackState::Error;
            return BufferUpdate::Failed(e.to_string());
        }
        self.loaded_version = Some(handle.version);
        self.engine.seek(position);
        self.stalled = false;

        if resume && let Err(rejected) = self.engine.play().await {
            tracing::warn!("{rejected}");
            self.state = PlaybackState::Deferred;
        }
        tracing::debug!(
            "swapped to buffer version {} at {:?}",
            handle.version,
            position
        );
        BufferUpdate::Swapped { position }
    }

    /// Start or resume playback of the current buffer.
    pub async fn play(&mut self) -> PlayOutcome {
        if self.state == PlaybackState::Playing {
            return PlayOutcome::AlreadyPlaying;
        }
        let Some(handle) = self.current.as_ref().filter(|h| h.decodable && !h.is_empty()) else {
            return PlayOutcome::NotReady;
        };

        if self.loaded_version != Some(handle.version) || self.state == PlaybackState::Stopped {
            let handle = handle.clone();
            self.engine.release();
            self.loaded_version = None;
            if let Err(e) = self.engine.load(&handle) {
                tracing::error!("failed to load buffer version {}: {e}", handle.version);
                self.state = PlaybackState::Error;
                return PlayOutcome::Failed(e.to_string());
            }
            self.loaded_version = Some(handle.version);
        }

        match self.engine.play().await {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                self.stalled = false;
                PlayOutcome::Started
            }
            Err(rejected) => {
                tracing::warn!("{rejected}");
                self.state = PlaybackState::Deferred;
                PlayOutcome::Deferred(rejected.reason)
            }
        }
    }

    /// Pause playback. Returns false if nothing was playing.
    pub fn pause(&mut self) -> bool {
        match self.state {
            PlaybackState::Playing => {
                self.engine.pause();
                self.state = PlaybackState::Paused;
                true
            }
            PlaybackState::Deferred => {
                self.state = PlaybackState::Paused;
                true
            }
            _ => false,
        }
    }

    /// Release the media resource and return to idle.
    pub fn stop(&mut self) {
        if self.loaded_version.take().is_some() {
            self.engine.release();
        }
        if self.state != PlaybackState::Idle {
            tracing::debug!("playback session {} stopped", self.session_id);
        }
        self.state = PlaybackState::Idle;
        self.current = None;
        self.segment = None;
        self.auto_started = false;
        self.stalled = false;
    }

    /// Check for end of media. Call periodically while playing.
    pub fn tick(&mut self) -> Option<PlaybackEvent> {
        if self.state != PlaybackState::Playing || !self.engine.is_ended() {
            return None;
        }
        let is_final = self.current.as_ref().is_some_and(|h| h.is_final);
        if is_final {
            self.engine.pause();
            self.state = PlaybackState::Stopped;
            tracing::debug!("segment {:?} ended", self.segment);
            return Some(PlaybackEvent::Ended {
                segment: self.segment,
            });
        }
        if self.stalled {
            return None;
        }
        self.stalled = true;
        let position = self.engine.position();
        tracing::debug!("playback caught up with stream at {position:?}");
        Some(PlaybackEvent::Stalled {
            segment: self.segment,
            position,
        })
    }
}
