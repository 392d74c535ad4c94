use super::segment::{Segment, SegmentStatus, SegmentTable};
use crate::config::SequencerConfig;
use crate::playback::{
    BufferUpdate, MediaEngine, PlayOutcome, PlaybackController, PlaybackEvent, PlaybackState,
};
use crate::stream::PlayableHandle;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

/// Requests a caller can send to a running sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerCommand {
    /// Jump to a segment, stopping whatever is playing.
    PlaySegment(usize),
    Pause,
    Resume,
    Stop,
}

/// Why a segment could not be played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Still not ready when the maximum wait elapsed.
    TimedOut {
        waited: Duration,
        status: SegmentStatus,
    },
    /// Synthesis or playback of the segment failed.
    Failed(String),
    OutOfRange,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::TimedOut { waited, status } => {
                write!(f, "still {status} after {waited:?}")
            }
            UnavailableReason::Failed(message) => write!(f, "failed: {message}"),
            UnavailableReason::OutOfRange => f.write_str("no such segment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequencerEvent {
    SegmentStarted { index: usize },
    /// The segment is loaded but not rendering, because the engine refused
    /// to start or playback is paused; send `Resume` to start it.
    SegmentDeferred { index: usize, reason: String },
    SegmentEnded { index: usize },
    SegmentUnavailable {
        index: usize,
        reason: UnavailableReason,
    },
    /// The last segment ended.
    Finished,
    Stopped,
}

/// How a [`SegmentSequencer::run`] ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceReport {
    /// Segments that started rendering, in order.
    pub played: Vec<usize>,
    /// Segment that halted the sequence, if any.
    pub halted: Option<(usize, UnavailableReason)>,
    pub finished: bool,
    pub stopped: bool,
}

enum Control {
    Continue,
    Schedule(usize),
    Stop,
}

/// Plays segments in order, waiting for each to become ready.
pub struct SegmentSequencer<E: MediaEngine> {
    controller: PlaybackController<E>,
    table: SegmentTable,
    config: SequencerConfig,
    tick: Duration,
    current: Option<usize>,
    /// Set by `Pause`; a segment that becomes ready meanwhile is staged only.
    paused: bool,
    events: Option<mpsc::UnboundedSender<SequencerEvent>>,
}

impl<E: MediaEngine> SegmentSequencer<E> {
    pub fn new(
        controller: PlaybackController<E>,
        table: SegmentTable,
        config: &SequencerConfig,
        tick: Duration,
    ) -> Self {
        Self {
            controller,
            table,
            config: config.clone(),
            tick: tick.max(Duration::from_millis(1)),
            current: None,
            paused: false,
            events: None,
        }
    }

    /// Send every [`SequencerEvent`] to `events`.
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SequencerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn controller(&self) -> &PlaybackController<E> {
        &self.controller
    }

    pub fn table(&self) -> &SegmentTable {
        &self.table
    }

    /// Start `index`, waiting up to the configured maximum for it to be ready.
    ///
    /// Any session already playing is stopped first. Returns whether the
    /// segment is rendering; a refused or paused start leaves it staged.
    pub async fn play_segment(&mut self, index: usize) -> Result<bool, UnavailableReason> {
        self.paused = false;
        let deadline = Instant::now() + self.config.max_wait();
        self.start(index, deadline).await
    }

    /// Drive playback from `first` until the last segment ends, a segment is
    /// unavailable, or a `Stop` command arrives.
    pub async fn run(
        &mut self,
        first: usize,
        mut commands: mpsc::Receiver<SequencerCommand>,
    ) -> SequenceReport {
        let mut report = SequenceReport::default();
        let mut pending = Some(self.schedule(first));
        let mut commands_open = true;
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if let Some((index, deadline)) = pending.take() {
                let command = tokio::select! {
                    started = self.start(index, deadline) => {
                        match started {
                            Ok(true) => report.played.push(index),
                            Ok(false) => {}
                            Err(reason) => {
                                report.halted = Some((index, reason));
                                break;
                            }
                        }
                        continue;
                    }
                    command = commands.recv(), if commands_open => command,
                };

                // A command interrupted the wait for `index`.
                let Some(command) = command else {
                    commands_open = false;
                    pending = Some((index, deadline));
                    continue;
                };
                match self.apply(command, &mut report).await {
                    Control::Continue => pending = Some((index, deadline)),
                    Control::Schedule(next) => pending = Some(self.schedule(next)),
                    Control::Stop => {
                        report.stopped = true;
                        break;
                    }
                }
                continue;
            }

            if !commands_open && self.controller.state() != PlaybackState::Playing {
                tracing::debug!(
                    "sequencer idle in state {} with no command source, exiting",
                    self.controller.state()
                );
                break;
            }

            tokio::select! {
                command = commands.recv(), if commands_open => {
                    let Some(command) = command else {
                        commands_open = false;
                        continue;
                    };
                    match self.apply(command, &mut report).await {
                        Control::Continue => {}
                        Control::Schedule(next) => pending = Some(self.schedule(next)),
                        Control::Stop => {
                            report.stopped = true;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if let Some(PlaybackEvent::Ended { .. }) = self.controller.tick()
                        && let Some(index) = self.current
                    {
                        self.emit(SequencerEvent::SegmentEnded { index });
                        let next = index + 1;
                        if next >= self.table.len().await {
                            tracing::info!("all {next} segments played");
                            self.emit(SequencerEvent::Finished);
                            report.finished = true;
                            break;
                        }
                        pending = Some(self.schedule(next));
                    }
                }
            }
        }

        report
    }

    fn schedule(&self, index: usize) -> (usize, Instant) {
        (index, Instant::now() + self.config.max_wait())
    }

    async fn apply(&mut self, command: SequencerCommand, report: &mut SequenceReport) -> Control {
        tracing::debug!("sequencer command {command:?}");
        match command {
            SequencerCommand::PlaySegment(index) => {
                self.paused = false;
                Control::Schedule(index)
            }
            SequencerCommand::Pause => {
                self.paused = true;
                self.controller.pause();
                Control::Continue
            }
            SequencerCommand::Resume => {
                self.paused = false;
                let outcome = self.controller.play().await;
                if let Some(index) = self.current {
                    if outcome == PlayOutcome::Started && report.played.last() != Some(&index) {
                        report.played.push(index);
                    }
                    self.report_outcome(index, outcome);
                }
                Control::Continue
            }
            SequencerCommand::Stop => {
                self.controller.stop();
                self.current = None;
                self.emit(SequencerEvent::Stopped);
                Control::Stop
            }
        }
    }

    async fn start(&mut self, index: usize, deadline: Instant) -> Result<bool, UnavailableReason> {
        self.controller.begin(Some(index));
        self.current = Some(index);

        let handle = match self.wait_until_ready(index, deadline).await {
            Ok(handle) => handle,
            Err(reason) => return Err(self.unavailable(index, reason)),
        };

        if self.paused {
            return match self.controller.stage(handle).await {
                BufferUpdate::Failed(message) => {
                    Err(self.unavailable(index, UnavailableReason::Failed(message)))
                }
                _ => {
                    tracing::info!("segment {index} ready while paused");
                    self.emit(SequencerEvent::SegmentDeferred {
                        index,
                        reason: "paused".to_string(),
                    });
                    Ok(false)
                }
            };
        }

        let outcome = match self.controller.on_buffer(handle).await {
            BufferUpdate::AutoStarted(outcome) => outcome,
            BufferUpdate::Failed(message) => PlayOutcome::Failed(message),
            _ => self.controller.play().await,
        };
        match outcome {
            PlayOutcome::NotReady => Err(self.unavailable(
                index,
                UnavailableReason::Failed("segment audio is not decodable".to_string()),
            )),
            PlayOutcome::Failed(message) => {
                Err(self.unavailable(index, UnavailableReason::Failed(message)))
            }
            outcome => {
                let rendering = matches!(outcome, PlayOutcome::Started | PlayOutcome::AlreadyPlaying);
                self.report_outcome(index, outcome);
                Ok(rendering)
            }
        }
    }

    async fn wait_until_ready(
        &self,
        index: usize,
        deadline: Instant,
    ) -> Result<PlayableHandle, UnavailableReason> {
        let started = Instant::now();
        let mut delay = self.config.initial_backoff();
        let max_delay = self.config.max_backoff();

        loop {
            let segment = self
                .table
                .get(index)
                .await
                .ok_or(UnavailableReason::OutOfRange)?;
            match segment {
                Segment {
                    status: SegmentStatus::Ready,
                    handle: Some(handle),
                    ..
                } => return Ok(handle),
                Segment {
                    status: SegmentStatus::Error,
                    error,
                    ..
                } => {
                    return Err(UnavailableReason::Failed(
                        error.unwrap_or_else(|| "segment synthesis failed".to_string()),
                    ));
                }
                Segment { status, .. } => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(UnavailableReason::TimedOut {
                            waited: now - started,
                            status,
                        });
                    }
                    tracing::debug!("segment {index} is {status}, checking again in {delay:?}");
                    tokio::time::sleep_until((now + delay).min(deadline)).await;
                    delay = (delay * 2).min(max_delay);
                }
            }
        }
    }

    fn report_outcome(&self, index: usize, outcome: PlayOutcome) {
        match outcome {
            PlayOutcome::Started | PlayOutcome::AlreadyPlaying => {
                tracing::info!("playing segment {index}");
                self.emit(SequencerEvent::SegmentStarted { index });
            }
            PlayOutcome::Deferred(reason) => {
                tracing::warn!("segment {index} deferred: {reason}");
                self.emit(SequencerEvent::SegmentDeferred { index, reason });
            }
            PlayOutcome::NotReady | PlayOutcome::Failed(_) => {
                tracing::debug!("segment {index} not started: {outcome:?}");
            }
        }
    }

    fn unavailable(&self, index: usize, reason: UnavailableReason) -> UnavailableReason {
        tracing::warn!("segment {index} unavailable: {reason}");
        self.emit(SequencerEvent::SegmentUnavailable {
            index,
            reason: reason.clone(),
        });
        reason
    }

    fn emit(&self, event: SequencerEvent) {
        if let Some(events) = &self.events
            && events.send(event).is_err()
        {
            tracing::debug!("sequencer event receiver dropped");
        }
    }
}
