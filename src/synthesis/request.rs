use crate::config::SynthesisConfig;
use crate::defaults;
use crate::error::{NarraError, Result};
use crate::stream::AudioFormat;
use serde::{Deserialize, Serialize};

/// Body of a streaming synthesis request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub provider: String,
    #[serde(default)]
    pub voice: Option<String>,
    pub speed: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: String,
    #[serde(rename = "audio_format")]
    pub format: AudioFormat,
}

impl SynthesisRequest {
    /// Builds a request for `text` with the configured provider and voice.
    pub fn from_config(text: impl Into<String>, config: &SynthesisConfig) -> Result<Self> {
        let format = config
            .format
            .parse::<AudioFormat>()
            .map_err(|message| NarraError::ConfigInvalidValue {
                key: "synthesis.format".to_string(),
                message,
            })?;
        Ok(Self {
            text: text.into(),
            provider: config.provider.clone(),
            voice: config.voice.clone(),
            speed: config.speed,
            pitch: config.pitch,
            volume: config.volume,
            language: config.language.clone(),
            format,
        })
    }

    /// Checks the same limits the server enforces.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(invalid("text must not be empty"));
        }
        let chars = self.text.chars().count();
        if chars > defaults::MAX_TEXT_CHARS {
            return Err(invalid(format!(
                "text is {chars} characters, limit is {}",
                defaults::MAX_TEXT_CHARS
            )));
        }
        if self.provider.trim().is_empty() {
            return Err(invalid("provider must not be empty"));
        }
        for (name, value) in [
            ("speed", self.speed),
            ("pitch", self.pitch),
            ("volume", self.volume),
        ] {
            if !(defaults::MIN_PROSODY..=defaults::MAX_PROSODY).contains(&value) {
                return Err(invalid(format!(
                    "{name} {value} outside {}..={}",
                    defaults::MIN_PROSODY,
                    defaults::MAX_PROSODY
                )));
            }
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> NarraError {
    NarraError::InvalidRequest {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> SynthesisRequest {
        SynthesisRequest::from_config(text, &SynthesisConfig::default()).unwrap()
    }

    #[test]
    fn test_from_config_uses_defaults() {
        let req = request("你好");
        assert_eq!(req.provider, "baidu");
        assert_eq!(req.language, "zh");
        assert_eq!(req.format, AudioFormat::Wav);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_unknown_format_in_config() {
        let config = SynthesisConfig {
            format: "ogg".to_string(),
            ..SynthesisConfig::default()
        };
        assert!(matches!(
            SynthesisRequest::from_config("hi", &config),
            Err(NarraError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_blank_text_is_rejected() {
        assert!(request("   ").validate().is_err());
        assert!(request("").validate().is_err());
    }

    #[test]
    fn test_text_limit_counts_characters() {
        let at_limit = "语".repeat(defaults::MAX_TEXT_CHARS);
        assert!(request(&at_limit).validate().is_ok());

        let over = "a".repeat(defaults::MAX_TEXT_CHARS + 1);
        let err = request(&over).validate().unwrap_err();
        assert!(err.to_string().contains("limit"), "got: {err}");
    }

    #[test]
    fn test_prosody_range() {
        let mut req = request("hello");
        req.speed = 2.0;
        req.pitch = 0.5;
        assert!(req.validate().is_ok());

        req.volume = 2.5;
        assert!(req.validate().unwrap_err().to_string().contains("volume"));

        req.volume = f32::NAN;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_serializes_audio_format_key() {
        let json = serde_json::to_value(request("hello")).unwrap();
        assert_eq!(json["audio_format"], "wav");
        assert!(json.get("format").is_none());
        assert_eq!(json["text"], "hello");
    }
}
