//! Document narration end to end: generate, wait, download pages, play.

use super::api::{HttpNarrationApi, NarrationRequest, NarrationStatus, VoiceSettings};
use super::monitor::{NarrationJobMonitor, SlideConversionMonitor};
use crate::config::Config;
use crate::error::{NarraError, Result};
use crate::playback::{MediaEngine, PlaybackController};
use crate::sequencer::{
    SegmentSequencer, SegmentTable, SequenceReport, SequencerCommand, SequencerEvent,
};
use crate::stream::{AudioFormat, PlayableHandle};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct NarrationOptions {
    /// Use audio already on the server instead of generating it.
    pub skip_generate: bool,
    /// Delete existing audio before generating.
    pub regenerate: bool,
    /// Deadline for generation plus readiness.
    pub timeout: Duration,
    pub style: String,
    pub voice: Option<VoiceSettings>,
    /// Wait for slide conversion before generating. Ignored with
    /// `skip_generate`.
    pub wait_for_slides: bool,
}

impl NarrationOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            skip_generate: false,
            regenerate: false,
            timeout: config.narration.timeout(),
            style: config.narration.style.clone(),
            voice: Some(VoiceSettings::from(&config.synthesis)),
            wait_for_slides: config.narration.wait_for_slides,
        }
    }
}

/// A narration whose pages are ready or downloading.
pub struct PreparedNarration {
    pub document_id: String,
    pub status: NarrationStatus,
    /// Page number of each segment.
    pub pages: Vec<u32>,
    pub table: SegmentTable,
    downloads: Option<JoinHandle<()>>,
}

impl PreparedNarration {
    /// Wait for every page download to settle.
    pub async fn downloads_finished(mut self) -> SegmentTable {
        if let Some(downloads) = self.downloads.take()
            && let Err(e) = downloads.await
        {
            tracing::error!("page download task failed: {e}");
        }
        self.table.clone()
    }
}

impl Drop for PreparedNarration {
    fn drop(&mut self) {
        if let Some(downloads) = &self.downloads {
            downloads.abort();
        }
    }
}

pub struct NarrationWorkflow {
    api: HttpNarrationApi,
    monitor: NarrationJobMonitor<HttpNarrationApi>,
    conversion: SlideConversionMonitor<HttpNarrationApi>,
    config: Config,
}

impl NarrationWorkflow {
    pub fn new(config: &Config) -> Self {
        let api = HttpNarrationApi::from_config(config);
        Self {
            monitor: NarrationJobMonitor::new(api.clone(), config.narration.poll_interval()),
            conversion: SlideConversionMonitor::new(api.clone(), config.narration.poll_interval()),
            api,
            config: config.clone(),
        }
    }

    pub fn api(&self) -> &HttpNarrationApi {
        &self.api
    }

    /// Generate narration (unless skipped) once the slides are converted,
    /// wait until the server lists its audio, then start downloading pages in
    /// order. One deadline covers every step.
    pub async fn prepare(
        &self,
        document_id: &str,
        options: &NarrationOptions,
    ) -> Result<PreparedNarration> {
        let started = Instant::now();
        let deadline = started + options.timeout;

        if options.wait_for_slides && !options.skip_generate {
            self.conversion
                .wait_for_slides(document_id, options.timeout)
                .await?;
        }

        if options.regenerate {
            let deleted = self.api.delete(document_id).await?;
            tracing::info!(
                "deleted {} narration files of {document_id}",
                deleted.deleted_files.len()
            );
        }

        let expected = if options.skip_generate {
            None
        } else {
            let request = NarrationRequest {
                voice_settings: options.voice.clone(),
                narration_style: options.style.clone(),
            };
            tracing::info!("generating narration for {document_id}");
            let summary =
                match tokio::time::timeout_at(deadline, self.api.trigger(document_id, &request))
                    .await
                {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(NarraError::JobTimeout {
                            job_id: document_id.to_string(),
                            elapsed: started.elapsed(),
                            last_error: Some("generation request still running".to_string()),
                        });
                    }
                };
            if summary.failed_count > 0 {
                tracing::warn!(
                    "{} of {} pages failed to generate",
                    summary.failed_count,
                    summary.total_slides
                );
            }
            Some(summary.success_count)
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        let status = self
            .monitor
            .wait_for_count(document_id, expected, remaining)
            .await?;

        let pages = status.pages();
        let table = SegmentTable::from_texts(pages.iter().map(|p| format!("page {p}")));
        let downloads = tokio::spawn(download_pages(
            self.api.clone(),
            document_id.to_string(),
            pages.clone(),
            table.clone(),
        ));

        Ok(PreparedNarration {
            document_id: document_id.to_string(),
            status,
            pages,
            table,
            downloads: Some(downloads),
        })
    }

    /// Play a prepared narration from `first` until it finishes, halts, or a
    /// `Stop` command arrives.
    ///
    /// Every started page is reported to the server as the current slide.
    pub async fn play<E: MediaEngine>(
        &self,
        prepared: &PreparedNarration,
        engine: E,
        first: usize,
        commands: mpsc::Receiver<SequencerCommand>,
        observer: Option<mpsc::UnboundedSender<SequencerEvent>>,
    ) -> SequenceReport {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let controller = PlaybackController::new(engine, &self.config.playback);
        let mut sequencer = SegmentSequencer::new(
            controller,
            prepared.table.clone(),
            &self.config.sequencer,
            self.config.playback.tick(),
        )
        .with_events(events_tx);

        let api = self.api.clone();
        let document_id = prepared.document_id.clone();
        let pages = prepared.pages.clone();
        let reporter = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if let SequencerEvent::SegmentStarted { index } = &event
                    && let Some(&page) = pages.get(*index)
                    && let Err(e) = api.report_current_slide(&document_id, page).await
                {
                    tracing::warn!("failed to report current slide {page}: {e}");
                }
                if let Some(observer) = &observer
                    && observer.send(event).is_err()
                {
                    tracing::debug!("narration observer dropped");
                }
            }
        });

        let report = sequencer.run(first, commands).await;
        drop(sequencer);
        if let Err(e) = reporter.await {
            tracing::error!("slide reporter task failed: {e}");
        }
        report
    }
}

/// Fetch each page's audio in order and publish it into `table`.
async fn download_pages(
    api: HttpNarrationApi,
    document_id: String,
    pages: Vec<u32>,
    table: SegmentTable,
) {
    for (index, page) in pages.into_iter().enumerate() {
        table.mark_streaming(index).await;
        match api.fetch_page_audio(&document_id, page).await {
            Ok(bytes) => {
                tracing::debug!("page {page}: {} bytes", bytes.len());
                table
                    .publish(index, PlayableHandle::from_complete(bytes, AudioFormat::Wav))
                    .await;
            }
            Err(e) => {
                tracing::error!("failed to download audio for page {page}: {e}");
                table.mark_error(index, e.to_string()).await;
            }
        }
    }
}
