//! Command implementations behind the CLI.
//!
//! `speak`: synthesis stream → accumulator → playback controller
//! `narrate`: generate → monitor → page downloads → segment sequencer

use crate::config::Config;
use crate::error::{NarraError, Result};
use crate::narration::{NarrationOptions, NarrationStatus, NarrationWorkflow};
use crate::playback::{ClockEngine, PlaybackController};
use crate::sequencer::{SequenceReport, SequencerCommand, SequencerEvent};
use crate::signal::TracingReporter;
use crate::synthesis::{LiveSynthesis, SessionSummary, SynthesisClient, SynthesisRequest, play_session};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Run the speak command: stream synthesis of `text` and play it as it grows.
///
/// # Arguments
/// * `config` - Base configuration (can be overridden by CLI args)
/// * `text` - Text to synthesize
/// * `provider`, `voice`, `format` - Optional overrides from CLI
/// * `output` - Write the final audio to this path
/// * `quiet` - Suppress status messages
#[allow(clippy::too_many_arguments)]
pub async fn run_speak_command(
    mut config: Config,
    text: String,
    provider: Option<String>,
    voice: Option<String>,
    format: Option<String>,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<SessionSummary> {
    if let Some(p) = provider {
        config.synthesis.provider = p;
    }
    if let Some(v) = voice {
        config.synthesis.voice = Some(v);
    }
    if let Some(f) = format {
        config.synthesis.format = f;
    }

    let request = SynthesisRequest::from_config(text, &config.synthesis)?;
    let client = SynthesisClient::from_config(&config)?;
    let mut live = LiveSynthesis::new(client, Arc::new(TracingReporter));

    let spinner = spinner(quiet, format!("Synthesizing with {}...", request.provider));
    let session = live.start(&request).await?;

    if let Some(pb) = spinner.clone() {
        let mut updates = session.subscribe();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let latest = updates.borrow_and_update().clone();
                if let Some(handle) = latest {
                    let buffered = handle.duration.unwrap_or_default();
                    pb.set_message(format!(
                        "{} KiB received, {:.1}s buffered",
                        handle.len() / 1024,
                        buffered.as_secs_f32()
                    ));
                }
            }
        });
    }

    let mut controller = PlaybackController::new(ClockEngine::new(), &config.playback);
    let result = play_session(&mut controller, session, config.playback.tick()).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let summary = result?;

    if let Some(path) = output {
        std::fs::write(&path, summary.buffer.bytes())?;
        if !quiet {
            eprintln!(
                "{} {} ({} bytes)",
                "Saved".green(),
                path.display(),
                summary.buffer.len()
            );
        }
    }

    if !quiet {
        let duration = summary
            .final_handle()
            .and_then(|h| h.duration)
            .unwrap_or_default();
        eprintln!(
            "{} {:.1}s of audio from {} chunks",
            "Done:".green(),
            duration.as_secs_f32(),
            summary.stats.accepted
        );
    }
    Ok(summary)
}

/// Run the narrate command: generate narration, wait for it, play every page.
#[allow(clippy::too_many_arguments)]
pub async fn run_narrate_command(
    config: Config,
    document_id: String,
    skip_generate: bool,
    regenerate: bool,
    style: Option<String>,
    from_page: u32,
    timeout: Option<Duration>,
    quiet: bool,
) -> Result<SequenceReport> {
    let mut options = NarrationOptions::from_config(&config);
    options.skip_generate = skip_generate;
    options.regenerate = regenerate;
    if let Some(s) = style {
        options.style = s;
    }
    if let Some(t) = timeout {
        options.timeout = t;
    }

    let workflow = NarrationWorkflow::new(&config);
    let message = if skip_generate {
        format!("Waiting for narration of {document_id}...")
    } else {
        format!("Generating narration for {document_id}...")
    };
    let spinner = spinner(quiet, message);
    let prepared = workflow.prepare(&document_id, &options).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let prepared = prepared?;

    let first = prepared
        .pages
        .iter()
        .position(|&page| page >= from_page)
        .ok_or_else(|| NarraError::InvalidRequest {
            message: format!(
                "no narration at or after page {from_page} ({} pages available)",
                prepared.pages.len()
            ),
        })?;

    if !quiet {
        eprintln!(
            "{} {} pages narrated, starting at page {}",
            "Ready:".green(),
            prepared.pages.len(),
            prepared.pages[first]
        );
    }

    let (commands_tx, commands_rx) = mpsc::channel(8);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok()
            && commands_tx.send(SequencerCommand::Stop).await.is_err()
        {
            tracing::debug!("sequencer already finished");
        }
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let pages = prepared.pages.clone();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if quiet {
                continue;
            }
            match event {
                SequencerEvent::SegmentStarted { index } => {
                    eprintln!("{} page {}", "▶".cyan(), page_label(&pages, index));
                }
                SequencerEvent::SegmentDeferred { index, reason } => {
                    eprintln!(
                        "{} page {} deferred: {reason}",
                        "⏸".yellow(),
                        page_label(&pages, index)
                    );
                }
                SequencerEvent::SegmentUnavailable { index, reason } => {
                    eprintln!(
                        "{} page {} unavailable: {reason}",
                        "✗".red(),
                        page_label(&pages, index)
                    );
                }
                SequencerEvent::SegmentEnded { .. } => {}
                SequencerEvent::Finished => eprintln!("{}", "Narration finished".green()),
                SequencerEvent::Stopped => eprintln!("{}", "Stopped".yellow()),
            }
        }
    });

    let report = workflow
        .play(
            &prepared,
            ClockEngine::new(),
            first,
            commands_rx,
            Some(events_tx),
        )
        .await;
    if let Err(e) = printer.await {
        tracing::debug!("event printer failed: {e}");
    }

    if let Some((index, reason)) = &report.halted {
        return Err(NarraError::NarrationFailed {
            message: format!(
                "page {} unavailable: {reason}",
                page_label(&prepared.pages, *index)
            ),
        });
    }
    Ok(report)
}

/// Run the status command: print which pages have narration audio.
pub async fn run_status_command(config: Config, document_id: String) -> Result<NarrationStatus> {
    let workflow = NarrationWorkflow::new(&config);
    let status = workflow.api().status(&document_id).await?;

    if status.has_narration {
        println!(
            "{}: {} audio files",
            status.document_id.bold(),
            status.total_audio_files
        );
        for file in &status.audio_files {
            println!(
                "  page {:>3}  {:>8} bytes  {}",
                file.page_number, file.size, file.filename
            );
        }
    } else {
        println!("{}: {}", status.document_id.bold(), "no narration".dimmed());
    }
    Ok(status)
}

fn page_label(pages: &[u32], index: usize) -> String {
    pages
        .get(index)
        .map_or_else(|| format!("#{index}"), |page| page.to_string())
}

fn spinner(quiet: bool, message: String) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}
