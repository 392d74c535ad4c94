//! Error types for narrastream.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NarraError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Request validation
    #[error("Invalid synthesis request: {message}")]
    InvalidRequest { message: String },

    // Transport errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Server returned status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Stream closed before a terminal event after {records} records")]
    StreamTruncated { records: u64 },

    #[error("Malformed response: {message}")]
    MalformedResponse { message: String },

    // Remote synthesis reported a failure
    #[error("Synthesis failed: {message}")]
    SynthesisFailed { message: String },

    // Playback errors
    #[error("Media engine error: {message}")]
    Engine { message: String },

    // Narration job errors
    #[error("Narration job {job_id} not ready after {elapsed:?}{}", last_error_suffix(.last_error))]
    JobTimeout {
        job_id: String,
        elapsed: Duration,
        last_error: Option<String>,
    },

    #[error("Narration generation failed: {message}")]
    NarrationFailed { message: String },

    #[error("Session cancelled")]
    Cancelled,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl NarraError {
    /// Returns true for failures that end the active session and must be
    /// shown to the user (transport and timeout classes).
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            NarraError::Transport { .. }
                | NarraError::HttpStatus { .. }
                | NarraError::StreamTruncated { .. }
                | NarraError::SynthesisFailed { .. }
                | NarraError::JobTimeout { .. }
                | NarraError::NarrationFailed { .. }
        )
    }
}

impl From<reqwest::Error> for NarraError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => NarraError::HttpStatus {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            },
            None => NarraError::Transport {
                message: e.to_string(),
            },
        }
    }
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, NarraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = NarraError::HttpStatus {
            status: 503,
            url: "http://localhost/api/tts/synthesize/stream".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Server returned status 503 for http://localhost/api/tts/synthesize/stream"
        );
    }

    #[test]
    fn test_stream_truncated_display() {
        let error = NarraError::StreamTruncated { records: 7 };
        assert_eq!(
            error.to_string(),
            "Stream closed before a terminal event after 7 records"
        );
    }

    #[test]
    fn test_job_timeout_display_without_last_error() {
        let error = NarraError::JobTimeout {
            job_id: "doc-1".to_string(),
            elapsed: Duration::from_secs(5),
            last_error: None,
        };
        assert_eq!(error.to_string(), "Narration job doc-1 not ready after 5s");
    }

    #[test]
    fn test_job_timeout_display_with_last_error() {
        let error = NarraError::JobTimeout {
            job_id: "doc-1".to_string(),
            elapsed: Duration::from_millis(5200),
            last_error: Some("connection refused".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "Narration job doc-1 not ready after 5.2s (last error: connection refused)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: NarraError = io_error.into();
        assert!(matches!(error, NarraError::Io(_)));
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_user_visible_classification() {
        assert!(NarraError::StreamTruncated { records: 0 }.is_user_visible());
        assert!(
            NarraError::JobTimeout {
                job_id: "x".to_string(),
                elapsed: Duration::ZERO,
                last_error: None,
            }
            .is_user_visible()
        );
        assert!(
            !NarraError::Engine {
                message: "autoplay blocked".to_string()
            }
            .is_user_visible()
        );
        assert!(!NarraError::Cancelled.is_user_visible());
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<u32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
