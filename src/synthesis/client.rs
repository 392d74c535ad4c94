use super::request::SynthesisRequest;
use crate::config::Config;
use crate::defaults;
use crate::error::{NarraError, Result};
use crate::signal::SignalReporter;
use crate::stream::{EventReader, FrameParser};
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Body of a streaming synthesis response.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Opens synthesis streams against `POST /api/tts/synthesize/stream`.
#[derive(Debug, Clone)]
pub struct SynthesisClient {
    client: reqwest::Client,
    base_url: String,
}

impl SynthesisClient {
    /// Creates a client. `connect_timeout` bounds connection setup only;
    /// the response body may stream for as long as synthesis takes.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| NarraError::Transport {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.server.base_url, config.server.request_timeout())
    }

    pub fn stream_url(&self) -> String {
        format!("{}/api/tts/synthesize/stream", self.base_url)
    }

    /// Sends `request` and returns a reader over the response's events.
    pub async fn open_stream(
        &self,
        request: &SynthesisRequest,
        reporter: Arc<dyn SignalReporter>,
    ) -> Result<EventReader<ByteStream>> {
        request.validate()?;

        let url = self.stream_url();
        tracing::debug!(
            "requesting {} chars from {} via {url}",
            request.text.chars().count(),
            request.provider
        );
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NarraError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body: ByteStream = Box::pin(response.bytes_stream());
        let parser = FrameParser::new(reporter).with_max_record_bytes(defaults::MAX_RECORD_BYTES);
        Ok(EventReader::new(body, parser))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynthesisConfig;
    use crate::signal::TracingReporter;

    #[test]
    fn test_stream_url() {
        let client = SynthesisClient::new("http://localhost:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.stream_url(),
            "http://localhost:8000/api/tts/synthesize/stream"
        );
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_sending() {
        // Nothing listens on this port; validation must fail first.
        let client = SynthesisClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let request = SynthesisRequest::from_config("  ", &SynthesisConfig::default()).unwrap();

        let result = client.open_stream(&request, Arc::new(TracingReporter)).await;
        assert!(matches!(result, Err(NarraError::InvalidRequest { .. })));
    }
}
