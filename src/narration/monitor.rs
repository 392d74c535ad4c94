//! Polling of backend jobs under a hard deadline: narration generation and
//! the slide conversion it depends on.

use super::api::{HttpNarrationApi, NarrationStatus, slide_image_filename};
use crate::error::{NarraError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Trait for querying the status of a narration job.
#[async_trait]
pub trait JobStatusCheck: Send + Sync {
    async fn check(&self, job_id: &str) -> Result<NarrationStatus>;
}

#[async_trait]
impl JobStatusCheck for HttpNarrationApi {
    async fn check(&self, job_id: &str) -> Result<NarrationStatus> {
        self.status(job_id).await
    }
}

/// Trait for asking whether a document's slides have been converted.
#[async_trait]
pub trait ConversionCheck: Send + Sync {
    async fn slides_converted(&self, document_id: &str) -> Result<bool>;
}

/// Conversion writes page images in order, so the first page's image
/// appearing means the converter has produced output for the document.
#[async_trait]
impl ConversionCheck for HttpNarrationApi {
    async fn slides_converted(&self, document_id: &str) -> Result<bool> {
        self.slide_image_ready(&slide_image_filename(document_id, 1))
            .await
    }
}

/// Poll every `interval` until `poll` yields a value or `timeout` elapses.
///
/// Failed polls are logged and retried. A poll still in flight at the
/// deadline is cut off.
async fn poll_until<T, F, Fut>(
    job_id: &str,
    interval: Duration,
    timeout: Duration,
    mut poll: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    let deadline = started + timeout;
    let mut last_error: Option<String> = None;

    let polling = async {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt = 0u32;
        loop {
            ticker.tick().await;
            attempt += 1;
            match poll(attempt).await {
                Ok(Some(value)) => return value,
                Ok(None) => last_error = None,
                Err(e) => {
                    tracing::warn!("{job_id} poll {attempt} failed: {e}");
                    last_error = Some(e.to_string());
                }
            }
        }
    };

    match tokio::time::timeout_at(deadline, polling).await {
        Ok(value) => Ok(value),
        Err(_) => Err(NarraError::JobTimeout {
            job_id: job_id.to_string(),
            elapsed: started.elapsed(),
            last_error,
        }),
    }
}

pub struct NarrationJobMonitor<C: JobStatusCheck> {
    check: C,
    poll_interval: Duration,
}

impl<C: JobStatusCheck> NarrationJobMonitor<C> {
    pub fn new(check: C, poll_interval: Duration) -> Self {
        Self {
            check,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn check(&self) -> &C {
        &self.check
    }

    /// Wait until the job reports narration audio.
    pub async fn wait_for_ready(&self, job_id: &str, timeout: Duration) -> Result<NarrationStatus> {
        self.wait_for_count(job_id, None, timeout).await
    }

    /// Wait until the job reports narration audio and, if `expected` is set,
    /// at least that many files.
    ///
    /// Polls every `poll_interval`, retrying failed polls. Fails with
    /// [`NarraError::JobTimeout`] once `timeout` has elapsed, cutting off a
    /// poll still in flight.
    pub async fn wait_for_count(
        &self,
        job_id: &str,
        expected: Option<usize>,
        timeout: Duration,
    ) -> Result<NarrationStatus> {
        poll_until(job_id, self.poll_interval, timeout, |attempt| async move {
            let status = self.check.check(job_id).await?;
            if status.is_ready(expected) {
                tracing::info!(
                    "narration {job_id} ready after {attempt} polls ({} files)",
                    status.audio_files.len()
                );
                Ok(Some(status))
            } else {
                tracing::debug!(
                    "narration {job_id} not ready: {} files listed",
                    status.audio_files.len()
                );
                Ok(None)
            }
        })
        .await
    }
}

/// Waits for the server to finish converting a document into slide images.
pub struct SlideConversionMonitor<C: ConversionCheck> {
    check: C,
    poll_interval: Duration,
}

impl<C: ConversionCheck> SlideConversionMonitor<C> {
    pub fn new(check: C, poll_interval: Duration) -> Self {
        Self {
            check,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    /// Wait until the document's slides are converted, failing with
    /// [`NarraError::JobTimeout`] after `timeout`.
    pub async fn wait_for_slides(&self, document_id: &str, timeout: Duration) -> Result<()> {
        poll_until(document_id, self.poll_interval, timeout, |attempt| async move {
            if self.check.slides_converted(document_id).await? {
                tracing::info!("slides of {document_id} converted after {attempt} polls");
                Ok(Some(()))
            } else {
                tracing::debug!("slides of {document_id} not converted yet");
                Ok(None)
            }
        })
        .await
    }
}

/// One scripted poll result of a [`ScriptedStatusCheck`].
#[derive(Debug, Clone)]
pub enum ScriptedPoll {
    Status(NarrationStatus),
    Fail(String),
    /// Never answers.
    Hang,
}

#[derive(Debug, Default)]
struct ScriptState {
    script: VecDeque<ScriptedPoll>,
    polls: Vec<Instant>,
}

/// Status check that replays a script, for tests.
///
/// The last entry repeats once the script runs out. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedStatusCheck {
    state: Arc<Mutex<ScriptState>>,
    delay: Duration,
}

impl ScriptedStatusCheck {
    pub fn new(script: impl IntoIterator<Item = ScriptedPoll>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                script: script.into_iter().collect(),
                polls: Vec::new(),
            })),
            delay: Duration::ZERO,
        }
    }

    /// Make every poll take `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_count(&self) -> usize {
        self.lock().polls.len()
    }

    /// Times at which polls started.
    pub fn poll_times(&self) -> Vec<Instant> {
        self.lock().polls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next(&self) -> Option<ScriptedPoll> {
        let mut state = self.lock();
        state.polls.push(Instant::now());
        if state.script.len() > 1 {
            state.script.pop_front()
        } else {
            state.script.front().cloned()
        }
    }
}

#[async_trait]
impl JobStatusCheck for ScriptedStatusCheck {
    async fn check(&self, job_id: &str) -> Result<NarrationStatus> {
        let step = self.next();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match step {
            Some(ScriptedPoll::Status(status)) => Ok(status),
            Some(ScriptedPoll::Fail(message)) => Err(NarraError::Transport { message }),
            Some(ScriptedPoll::Hang) => std::future::pending().await,
            None => Err(NarraError::Other(format!("no scripted status for {job_id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narration::api::AudioFile;

    fn status(files: u32) -> NarrationStatus {
        NarrationStatus {
            document_id: "doc".to_string(),
            total_audio_files: files as usize,
            audio_files: (1..=files)
                .map(|page| AudioFile {
                    page_number: page,
                    filename: format!("doc_page_{page}.wav"),
                    size: 10,
                    url: format!("/api/slides/doc/audio/{page}"),
                })
                .collect(),
            has_narration: files > 0,
        }
    }

    fn monitor(check: &ScriptedStatusCheck) -> NarrationJobMonitor<ScriptedStatusCheck> {
        NarrationJobMonitor::new(check.clone(), Duration::from_millis(1_000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_first_poll() {
        let check = ScriptedStatusCheck::new([ScriptedPoll::Status(status(2))]);
        let result = monitor(&check)
            .wait_for_ready("doc", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.audio_files.len(), 2);
        assert_eq!(check.poll_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_fixed_interval_until_ready() {
        let check = ScriptedStatusCheck::new([
            ScriptedPoll::Status(status(0)),
            ScriptedPoll::Status(status(0)),
            ScriptedPoll::Status(status(1)),
        ]);
        let started = Instant::now();
        monitor(&check)
            .wait_for_ready("doc", Duration::from_secs(10))
            .await
            .unwrap();

        let offsets: Vec<Duration> = check
            .poll_times()
            .iter()
            .map(|t| t.duration_since(started))
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expected_count_gates_readiness() {
        let check = ScriptedStatusCheck::new([
            ScriptedPoll::Status(status(1)),
            ScriptedPoll::Status(status(2)),
            ScriptedPoll::Status(status(3)),
        ]);
        let result = monitor(&check)
            .wait_for_count("doc", Some(3), Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(result.total_audio_files, 3);
        assert_eq!(check.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_retried() {
        let check = ScriptedStatusCheck::new([
            ScriptedPoll::Fail("connection refused".to_string()),
            ScriptedPoll::Status(status(1)),
        ]);
        assert!(
            monitor(&check)
                .wait_for_ready("doc", Duration::from_secs(5))
                .await
                .is_ok()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_times_out_at_deadline() {
        let check = ScriptedStatusCheck::new([ScriptedPoll::Status(status(0))]);
        let started = Instant::now();
        let result = monitor(&check)
            .wait_for_ready("doc", Duration::from_millis(5_000))
            .await;

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(5_000), "returned early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(5_100), "returned late: {elapsed:?}");
        match result {
            Err(NarraError::JobTimeout {
                job_id, last_error, ..
            }) => {
                assert_eq!(job_id, "doc");
                assert_eq!(last_error, None);
            }
            other => panic!("expected JobTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_carries_last_poll_error() {
        let check = ScriptedStatusCheck::new([ScriptedPoll::Fail("connection refused".to_string())]);
        let result = monitor(&check)
            .wait_for_ready("doc", Duration::from_millis(5_200))
            .await;

        let err = result.unwrap_err();
        assert!(
            err.to_string().contains("connection refused"),
            "got: {err}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_poll_is_cut_off_at_deadline() {
        let check = ScriptedStatusCheck::new([ScriptedPoll::Hang]);
        let started = Instant::now();
        let result = monitor(&check)
            .wait_for_ready("doc", Duration::from_secs(3))
            .await;

        assert!(matches!(result, Err(NarraError::JobTimeout { .. })));
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(check.poll_count(), 1);
    }

    /// Reports slides converted from poll number `ready_on` onwards.
    struct ConvertsAfter {
        ready_on: usize,
        polls: std::sync::atomic::AtomicUsize,
    }

    impl ConvertsAfter {
        fn new(ready_on: usize) -> Self {
            Self {
                ready_on,
                polls: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn polls(&self) -> usize {
            self.polls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConversionCheck for Arc<ConvertsAfter> {
        async fn slides_converted(&self, _document_id: &str) -> Result<bool> {
            let poll = self.polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            Ok(poll >= self.ready_on)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversion_wait_polls_until_images_exist() {
        let check = Arc::new(ConvertsAfter::new(3));
        let started = Instant::now();
        SlideConversionMonitor::new(check.clone(), Duration::from_millis(500))
            .wait_for_slides("doc", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(check.polls(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conversion_wait_times_out() {
        let check = Arc::new(ConvertsAfter::new(usize::MAX));
        let result = SlideConversionMonitor::new(check.clone(), Duration::from_millis(500))
            .wait_for_slides("doc", Duration::from_millis(1_800))
            .await;

        match result {
            Err(NarraError::JobTimeout { job_id, .. }) => assert_eq!(job_id, "doc"),
            other => panic!("expected JobTimeout, got {other:?}"),
        }
        assert_eq!(check.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_polls_do_not_overrun_deadline() {
        let check = ScriptedStatusCheck::new([ScriptedPoll::Status(status(0))])
            .with_delay(Duration::from_millis(1_500));
        let started = Instant::now();
        let result = monitor(&check)
            .wait_for_ready("doc", Duration::from_secs(4))
            .await;

        assert!(result.is_err());
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }
}
