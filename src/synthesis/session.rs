//! Live synthesis sessions: one stream, one growing buffer, one playback.
//!
//! A session's reader runs in its own task and publishes buffer snapshots
//! through a `watch` channel, so a consumer only ever sees the newest
//! version. Starting a new session through [`LiveSynthesis`] aborts the
//! previous reader.

use super::client::SynthesisClient;
use super::request::SynthesisRequest;
use crate::error::{NarraError, Result};
use crate::playback::{MediaEngine, PlaybackController, PlaybackEvent, PlaybackState};
use crate::signal::SignalReporter;
use crate::stream::{
    AudioBuffer, AudioChunkAccumulator, AudioFormat, EventKind, EventReader, IngestOutcome,
    IngestStats, PlayableHandle,
};
use bytes::Bytes;
use futures_util::Stream;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

/// What a finished session produced.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: Option<String>,
    pub provider: Option<String>,
    pub voice: Option<String>,
    /// Closing note of the `complete` event.
    pub message: Option<String>,
    pub buffer: AudioBuffer,
    pub stats: IngestStats,
}

impl SessionSummary {
    pub fn final_handle(&self) -> Option<&PlayableHandle> {
        self.buffer.handle()
    }
}

/// Read `reader` to its end, publishing every new snapshot to `updates`.
///
/// A remote `error` event fails the session with
/// [`NarraError::SynthesisFailed`].
pub async fn run_session<S, E>(
    mut reader: EventReader<S>,
    format: AudioFormat,
    reporter: Arc<dyn SignalReporter>,
    updates: watch::Sender<Option<PlayableHandle>>,
) -> Result<SessionSummary>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    let mut accumulator = AudioChunkAccumulator::new(format, reporter);
    let mut summary = SessionSummary {
        session_id: None,
        provider: None,
        voice: None,
        message: None,
        buffer: AudioBuffer::new(format),
        stats: IngestStats::default(),
    };

    while let Some(event) = reader.next_event().await? {
        match event.kind {
            EventKind::Start => {
                tracing::info!(
                    "synthesis session {} started (provider {}, {} chars)",
                    event.session_id.as_deref().unwrap_or("?"),
                    event.provider.as_deref().unwrap_or("?"),
                    event.text_length.unwrap_or_default()
                );
                summary.session_id = event.session_id.clone();
                summary.provider = event.provider.clone();
                summary.voice = event.voice.clone();
            }
            EventKind::Complete => summary.message = event.message.clone(),
            EventKind::Heartbeat => tracing::trace!("heartbeat"),
            _ => {}
        }

        match accumulator.ingest(&event) {
            IngestOutcome::Updated(handle) | IngestOutcome::Finalized(handle) => {
                updates.send_replace(Some(handle));
            }
            IngestOutcome::Failed(message) => {
                tracing::error!("synthesis failed: {message}");
                return Err(NarraError::SynthesisFailed { message });
            }
            IngestOutcome::Unchanged | IngestOutcome::Dropped(_) => {}
        }
    }

    let stats = accumulator.stats();
    tracing::info!(
        "synthesis finished: {} chunks, {} bytes, {} dropped",
        stats.accepted,
        accumulator.buffer().len(),
        stats.duplicates + stats.regressions + stats.decode_failures + stats.after_final
    );
    summary.stats = stats;
    summary.buffer = accumulator.into_buffer();
    Ok(summary)
}

/// A running session.
pub struct SessionHandle {
    updates: watch::Receiver<Option<PlayableHandle>>,
    task: JoinHandle<Result<SessionSummary>>,
}

impl SessionHandle {
    /// A receiver that always holds the newest buffer snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Option<PlayableHandle>> {
        self.updates.clone()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the stream to end.
    pub async fn finish(self) -> Result<SessionSummary> {
        self.task.await.map_err(join_error)?
    }
}

fn join_error(e: JoinError) -> NarraError {
    if e.is_cancelled() {
        NarraError::Cancelled
    } else {
        NarraError::Other(format!("synthesis task failed: {e}"))
    }
}

/// Starts live sessions, keeping at most one reader alive.
pub struct LiveSynthesis {
    client: SynthesisClient,
    reporter: Arc<dyn SignalReporter>,
    active: Option<AbortHandle>,
}

impl LiveSynthesis {
    pub fn new(client: SynthesisClient, reporter: Arc<dyn SignalReporter>) -> Self {
        Self {
            client,
            reporter,
            active: None,
        }
    }

    /// Open a stream for `request`, aborting any session started earlier.
    pub async fn start(&mut self, request: &SynthesisRequest) -> Result<SessionHandle> {
        self.cancel();

        let reader = self
            .client
            .open_stream(request, Arc::clone(&self.reporter))
            .await?;
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(run_session(
            reader,
            request.format,
            Arc::clone(&self.reporter),
            tx,
        ));
        self.active = Some(task.abort_handle());
        Ok(SessionHandle { updates: rx, task })
    }

    /// Abort the current session's reader, if any.
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take()
            && !active.is_finished()
        {
            tracing::debug!("aborting previous synthesis session");
            active.abort();
        }
    }
}

impl Drop for LiveSynthesis {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Play a session through `controller` while it streams.
///
/// Returns once playback of the final buffer ends, or once the stream is
/// done and playback is not running (paused, deferred, nothing to play).
/// A failed stream stops playback and returns the error.
pub async fn play_session<E: MediaEngine>(
    controller: &mut PlaybackController<E>,
    session: SessionHandle,
    tick: Duration,
) -> Result<SessionSummary> {
    let SessionHandle {
        mut updates,
        mut task,
    } = session;
    let mut ticker = tokio::time::interval(tick.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut updates_open = true;
    let mut summary: Option<SessionSummary> = None;

    loop {
        tokio::select! {
            changed = updates.changed(), if updates_open => {
                if changed.is_err() {
                    updates_open = false;
                    continue;
                }
                let latest = updates.borrow_and_update().clone();
                if let Some(handle) = latest {
                    controller.on_buffer(handle).await;
                }
            }
            joined = &mut task, if summary.is_none() => {
                match joined.map_err(join_error).and_then(|result| result) {
                    Ok(done) => {
                        if let Some(handle) = done.final_handle() {
                            controller.on_buffer(handle.clone()).await;
                        }
                        summary = Some(done);
                    }
                    Err(e) => {
                        controller.stop();
                        return Err(e);
                    }
                }
            }
            _ = ticker.tick() => {
                if let Some(PlaybackEvent::Ended { .. }) = controller.tick()
                    && summary.is_some()
                {
                    break;
                }
                if summary.is_some() && controller.state() != PlaybackState::Playing {
                    break;
                }
            }
        }
    }

    summary.ok_or(NarraError::Cancelled)
}
