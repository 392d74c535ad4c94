//! HTTP client for the document narration endpoints.

use crate::config::{Config, SynthesisConfig};
use crate::error::{NarraError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One generated audio file of a narration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFile {
    /// 1-based page the audio narrates.
    pub page_number: u32,
    pub filename: String,
    pub size: u64,
    pub url: String,
}

/// Response of the narration status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationStatus {
    pub document_id: String,
    #[serde(default)]
    pub total_audio_files: usize,
    #[serde(default)]
    pub audio_files: Vec<AudioFile>,
    #[serde(default)]
    pub has_narration: bool,
}

impl NarrationStatus {
    /// True when narration audio exists and, if `expected` is known, at least
    /// that many files are listed.
    pub fn is_ready(&self, expected: Option<usize>) -> bool {
        let files = self.total_audio_files.max(self.audio_files.len());
        self.has_narration && expected.is_none_or(|n| files >= n)
    }

    /// Listed page numbers in ascending order.
    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.audio_files.iter().map(|f| f.page_number).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }
}

/// Voice overrides sent with a narration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    pub speed: f32,
    pub pitch: f32,
    pub volume: f32,
    pub format: String,
}

impl From<&SynthesisConfig> for VoiceSettings {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            voice: config.voice.clone(),
            speed: config.speed,
            pitch: config.pitch,
            volume: config.volume,
            format: config.format.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationRequest {
    #[serde(default)]
    pub voice_settings: Option<VoiceSettings>,
    pub narration_style: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub document_id: String,
    pub total_slides: usize,
    pub success_count: usize,
    pub failed_count: usize,
    #[serde(default)]
    pub generated_files: Vec<String>,
    #[serde(default)]
    pub narration_style: String,
}

/// Response of the narration trigger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<GenerationSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub deleted_files: Vec<String>,
}

/// Client for `/api/slides/{document_id}/...`.
#[derive(Debug, Clone)]
pub struct HttpNarrationApi {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpNarrationApi {
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.server.base_url, config.server.request_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, document_id: &str, path: &str) -> String {
        format!("{}/api/slides/{document_id}/{path}", self.base_url)
    }

    pub async fn status(&self, document_id: &str) -> Result<NarrationStatus> {
        let url = self.url(document_id, "narration/status");
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        decode_json(check_status(response, &url)?).await
    }

    /// Downloads the narration audio of one page.
    pub async fn fetch_page_audio(&self, document_id: &str, page_number: u32) -> Result<Bytes> {
        let url = self.url(document_id, &format!("audio/{page_number}"));
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        Ok(check_status(response, &url)?.bytes().await?)
    }

    /// Starts narration generation.
    ///
    /// The server answers only after every page was synthesized, so this call
    /// carries no request timeout; callers bound it themselves.
    pub async fn trigger(
        &self,
        document_id: &str,
        request: &NarrationRequest,
    ) -> Result<GenerationSummary> {
        let url = self.url(document_id, "narration");
        let response = self.client.post(&url).json(request).send().await?;
        let body: GenerationResponse = decode_json(check_status(response, &url)?).await?;
        match body {
            GenerationResponse {
                success: true,
                data: Some(summary),
                ..
            } => Ok(summary),
            GenerationResponse { message, .. } => Err(NarraError::NarrationFailed {
                message: if message.is_empty() {
                    format!("narration generation for {document_id} failed")
                } else {
                    message
                },
            }),
        }
    }

    /// Deletes every generated audio file of a document.
    pub async fn delete(&self, document_id: &str) -> Result<DeletionResponse> {
        let url = self.url(document_id, "narration");
        let response = self
            .client
            .delete(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        decode_json(check_status(response, &url)?).await
    }

    /// Whether a converted slide image exists on the server.
    ///
    /// A missing image answers 404, which means "not converted yet" rather
    /// than an error.
    pub async fn slide_image_ready(&self, filename: &str) -> Result<bool> {
        let url = format!("{}/api/slides/images/{filename}", self.base_url);
        let response = self
            .client
            .head(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response, &url)?;
        Ok(true)
    }

    /// Tells the server which page is being presented.
    pub async fn report_current_slide(&self, document_id: &str, page_number: u32) -> Result<()> {
        let url = format!(
            "{}?current_slide={page_number}",
            self.url(document_id, "status")
        );
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;
        check_status(response, &url)?;
        Ok(())
    }
}

/// Name under which the server stores the converted image of a page.
pub fn slide_image_filename(document_id: &str, page_number: u32) -> String {
    format!("{document_id}_page_{page_number}.png")
}

fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(NarraError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| NarraError::MalformedResponse {
        message: e.to_string(),
    })
}
