//! End-to-end synthesis streaming against an in-process HTTP server.

use axum::Router;
use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use narrastream::config::{PlaybackConfig, SynthesisConfig};
use narrastream::playback::{ClockEngine, MockMediaEngine, PlaybackController, PlaybackState};
use narrastream::signal::TracingReporter;
use narrastream::synthesis::{LiveSynthesis, SynthesisClient, SynthesisRequest, play_session};
use narrastream::{EventKind, NarraError, StreamEvent};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

fn wav(sample_rate: u32, samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 64) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn start_event() -> StreamEvent {
    StreamEvent {
        session_id: Some("s-1".to_string()),
        provider: Some("baidu".to_string()),
        text_length: Some(11),
        ..StreamEvent::new(EventKind::Start)
    }
}

fn chunk_event(sequence: u64, bytes: &[u8]) -> StreamEvent {
    StreamEvent {
        session_id: Some("s-1".to_string()),
        ..StreamEvent::audio_chunk(sequence, STANDARD.encode(bytes))
    }
}

fn complete_event() -> StreamEvent {
    StreamEvent {
        message: Some("done".to_string()),
        is_final: true,
        ..StreamEvent::new(EventKind::Complete)
    }
}

fn sse(events: &[StreamEvent]) -> String {
    events
        .iter()
        .map(|e| format!("data: {}\n\n", e.to_json().unwrap()))
        .collect()
}

/// Serve `body` in pieces of `piece` bytes, pausing `delay` between them.
fn streamed(body: String, piece: usize, delay: Duration) -> Response {
    let pieces: Vec<Bytes> = body
        .into_bytes()
        .chunks(piece)
        .map(Bytes::copy_from_slice)
        .collect();
    let stream = futures_util::stream::unfold(pieces.into_iter(), move |mut rest| async move {
        let next = rest.next()?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Some((Ok::<_, std::io::Error>(next), rest))
    });
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn synthesis_server(body: String, piece: usize, delay: Duration) -> String {
    let router = Router::new().route(
        "/api/tts/synthesize/stream",
        post(move || {
            let body = body.clone();
            async move { streamed(body, piece, delay) }
        }),
    );
    serve(router).await
}

fn request(text: &str) -> SynthesisRequest {
    SynthesisRequest::from_config(text, &SynthesisConfig::default()).unwrap()
}

#[tokio::test]
async fn test_hello_world_stream_plays_to_completion() {
    let audio = wav(8_000, 800);
    let (a, rest) = audio.split_at(100);
    let (b, c) = rest.split_at(700);
    let body = sse(&[
        start_event(),
        chunk_event(1, a),
        chunk_event(2, b),
        chunk_event(3, c),
        complete_event(),
    ]);
    // Odd piece size so records straddle network reads.
    let base_url = synthesis_server(body, 37, Duration::ZERO).await;

    let client = SynthesisClient::new(&base_url, Duration::from_secs(2)).unwrap();
    let mut live = LiveSynthesis::new(client, Arc::new(TracingReporter));
    let session = live.start(&request("Hello World")).await.unwrap();

    let engine = MockMediaEngine::new().with_instant_playback();
    let info = engine.clone();
    let mut controller = PlaybackController::new(engine, &PlaybackConfig::default());
    let summary = play_session(&mut controller, session, Duration::from_millis(5))
        .await
        .unwrap();

    assert_eq!(summary.buffer.bytes(), audio.as_slice());
    assert_eq!(summary.session_id.as_deref(), Some("s-1"));
    assert_eq!(summary.message.as_deref(), Some("done"));
    assert_eq!(summary.stats.accepted, 3);
    assert!(summary.buffer.is_final());

    assert_eq!(controller.state(), PlaybackState::Stopped);
    assert_eq!(info.loaded_version(), Some(summary.buffer.version()));
    assert_eq!(info.max_active(), 1);
}

#[tokio::test]
async fn test_duplicate_and_regressed_chunks_are_ignored() {
    let audio = wav(8_000, 400);
    let (a, b) = audio.split_at(300);
    let body = sse(&[
        start_event(),
        chunk_event(1, a),
        chunk_event(1, a),
        chunk_event(2, b),
        chunk_event(1, a),
        complete_event(),
    ]);
    let base_url = synthesis_server(body, 4096, Duration::ZERO).await;

    let client = SynthesisClient::new(&base_url, Duration::from_secs(2)).unwrap();
    let mut live = LiveSynthesis::new(client, Arc::new(TracingReporter));
    let summary = live
        .start(&request("Hello World"))
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(summary.buffer.bytes(), audio.as_slice());
    assert_eq!(summary.buffer.chunk_count(), 2);
    assert_eq!(summary.stats.accepted, 2);
    assert_eq!(summary.stats.duplicates, 1);
    assert_eq!(summary.stats.regressions, 1);
}

#[tokio::test]
async fn test_playback_swaps_buffers_while_streaming() {
    // 0.4s of audio arriving in four pieces 60ms apart; playback starts on
    // the first piece and keeps going across every swap.
    let audio = wav(8_000, 3_200);
    let pieces: Vec<&[u8]> = audio.chunks(audio.len().div_ceil(4)).collect();
    let mut events = vec![start_event()];
    for (i, piece) in pieces.iter().enumerate() {
        events.push(chunk_event(i as u64 + 1, piece));
    }
    events.push(complete_event());
    let records: Vec<String> = events.iter().map(|e| sse(std::slice::from_ref(e))).collect();

    let router = Router::new().route(
        "/api/tts/synthesize/stream",
        post(move || {
            let records = records.clone();
            async move {
                let stream = futures_util::stream::unfold(records.into_iter(), |mut rest| async move {
                    let next = rest.next()?;
                    tokio::time::sleep(Duration::from_millis(60)).await;
                    Some((Ok::<_, std::io::Error>(Bytes::from(next)), rest))
                });
                Response::builder()
                    .header("content-type", "text/event-stream")
                    .body(Body::from_stream(stream))
                    .unwrap()
            }
        }),
    );
    let base_url = serve(router).await;

    let client = SynthesisClient::new(&base_url, Duration::from_secs(2)).unwrap();
    let mut live = LiveSynthesis::new(client, Arc::new(TracingReporter));
    let session = live.start(&request("Hello World")).await.unwrap();

    let mut controller = PlaybackController::new(ClockEngine::new(), &PlaybackConfig::default());
    let started = std::time::Instant::now();
    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        play_session(&mut controller, session, Duration::from_millis(10)),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(summary.buffer.bytes(), audio.as_slice());
    assert_eq!(controller.state(), PlaybackState::Stopped);
    assert_eq!(controller.version(), Some(summary.buffer.version()));
    // Playback covered the whole 0.4s of audio.
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[tokio::test]
async fn test_error_event_fails_session() {
    let error = StreamEvent {
        error: Some("provider quota exceeded".to_string()),
        ..StreamEvent::new(EventKind::Error)
    };
    let body = sse(&[start_event(), chunk_event(1, &wav(8_000, 10)), error]);
    let base_url = synthesis_server(body, 4096, Duration::ZERO).await;

    let client = SynthesisClient::new(&base_url, Duration::from_secs(2)).unwrap();
    let mut live = LiveSynthesis::new(client, Arc::new(TracingReporter));
    let session = live.start(&request("Hello World")).await.unwrap();
    let mut controller =
        PlaybackController::new(MockMediaEngine::new(), &PlaybackConfig::default());

    let result = play_session(&mut controller, session, Duration::from_millis(5)).await;
    match result {
        Err(NarraError::SynthesisFailed { message }) => {
            assert!(message.contains("quota"), "got: {message}")
        }
        other => panic!("expected SynthesisFailed, got {other:?}"),
    }
    assert_eq!(controller.state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_stream_without_terminal_event_is_truncated() {
    let body = sse(&[start_event(), chunk_event(1, &wav(8_000, 10))]);
    let base_url = synthesis_server(body, 4096, Duration::ZERO).await;

    let client = SynthesisClient::new(&base_url, Duration::from_secs(2)).unwrap();
    let mut live = LiveSynthesis::new(client, Arc::new(TracingReporter));
    let result = live
        .start(&request("Hello World"))
        .await
        .unwrap()
        .finish()
        .await;

    assert!(matches!(result, Err(NarraError::StreamTruncated { .. })));
}

#[tokio::test]
async fn test_server_error_status_is_reported() {
    let router = Router::new().route(
        "/api/tts/synthesize/stream",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response() }),
    );
    let base_url = serve(router).await;

    let client = SynthesisClient::new(&base_url, Duration::from_secs(2)).unwrap();
    let mut live = LiveSynthesis::new(client, Arc::new(TracingReporter));
    let result = live.start(&request("Hello World")).await;

    match result {
        Err(NarraError::HttpStatus { status, url }) => {
            assert_eq!(status, 503);
            assert!(url.ends_with("/api/tts/synthesize/stream"));
        }
        other => panic!("expected HttpStatus, got {:?}", other.map(|_| ())),
    }
}
