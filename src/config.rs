use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub synthesis: SynthesisConfig,
    pub playback: PlaybackConfig,
    pub sequencer: SequencerConfig,
    pub narration: NarrationConfig,
}

/// Backend connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Voice settings sent with every synthesis request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SynthesisConfig {
    pub provider: String,
    pub voice: Option<String>,
    pub speed: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: String,
    pub format: String,
}

/// Playback controller configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    pub min_buffered_ms: u64,
    pub auto_start: bool,
    pub tick_ms: u64,
}

/// Segment sequencer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SequencerConfig {
    pub max_wait_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Narration job configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarrationConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
    pub style: String,
    /// Wait for the server to finish converting slides to images before
    /// generating narration.
    pub wait_for_slides: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: defaults::DEFAULT_PROVIDER.to_string(),
            voice: None,
            speed: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            format: defaults::DEFAULT_FORMAT.to_string(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            min_buffered_ms: defaults::MIN_BUFFERED_MS,
            auto_start: true,
            tick_ms: defaults::PLAYBACK_TICK_MS,
        }
    }
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: defaults::SEGMENT_MAX_WAIT_MS,
            initial_backoff_ms: defaults::SEGMENT_INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::SEGMENT_MAX_BACKOFF_MS,
        }
    }
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::NARRATION_POLL_INTERVAL_MS,
            timeout_ms: defaults::NARRATION_TIMEOUT_MS,
            style: defaults::NARRATION_STYLE.to_string(),
            wait_for_slides: true,
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PlaybackConfig {
    pub fn min_buffered(&self) -> Duration {
        Duration::from_millis(self.min_buffered_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl SequencerConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.max(1))
    }

    /// Never below the initial backoff.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms).max(self.initial_backoff())
    }
}

impl NarrationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing; invalid TOML is an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - NARRASTREAM_BASE_URL → server.base_url
    /// - NARRASTREAM_PROVIDER → synthesis.provider
    /// - NARRASTREAM_VOICE → synthesis.voice
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("NARRASTREAM_BASE_URL")
            && !url.is_empty()
        {
            self.server.base_url = url;
        }

        if let Ok(provider) = std::env::var("NARRASTREAM_PROVIDER")
            && !provider.is_empty()
        {
            self.synthesis.provider = provider;
        }

        if let Ok(voice) = std::env::var("NARRASTREAM_VOICE")
            && !voice.is_empty()
        {
            self.synthesis.voice = Some(voice);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/narrastream/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("narrastream")
            .join("config.toml")
    }
}
