//! Audio formats produced by the synthesis providers and how to tell when a
//! partial buffer of each is playable.

use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use std::time::Duration;

/// Container/codec of a synthesized waveform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    /// Headerless 16-bit little-endian mono PCM.
    Pcm,
}

impl AudioFormat {
    pub fn mime(self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Pcm => "audio/L16",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Pcm => "pcm",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" | "wave" | "audio/wav" | "audio/x-wav" => Ok(AudioFormat::Wav),
            "mp3" | "mpeg" | "audio/mpeg" => Ok(AudioFormat::Mp3),
            "pcm" | "raw" | "audio/l16" => Ok(AudioFormat::Pcm),
            other => Err(format!("unsupported audio format '{other}'")),
        }
    }
}

/// What a byte prefix of a waveform is good for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    /// True when a player could start rendering these bytes.
    pub decodable: bool,
    /// Audio duration covered by the bytes, when it can be told.
    pub duration: Option<Duration>,
}

impl AudioInfo {
    const EMPTY: AudioInfo = AudioInfo {
        decodable: false,
        duration: None,
    };
}

/// Bytes of a buffer's head that [`inspect_head`] needs to see. Covers the
/// RIFF/fmt chunks of any WAV a provider is expected to send.
pub const HEADER_BYTES: usize = 4096;

/// Inspects a (possibly partial) buffer of `format` audio.
pub fn inspect(format: AudioFormat, bytes: &[u8]) -> AudioInfo {
    inspect_head(format, bytes, bytes.len())
}

/// Inspects a buffer of `total_len` bytes given only its first bytes.
///
/// `head` must hold at least [`HEADER_BYTES`] bytes, or the whole
/// buffer when it is shorter.
pub fn inspect_head(format: AudioFormat, head: &[u8], total_len: usize) -> AudioInfo {
    if total_len == 0 {
        return AudioInfo::EMPTY;
    }
    match format {
        AudioFormat::Wav => inspect_wav(head, total_len),
        AudioFormat::Mp3 => AudioInfo {
            decodable: true,
            duration: Some(duration_from_rate(
                total_len as u64,
                defaults::COMPRESSED_BYTES_PER_SEC,
            )),
        },
        AudioFormat::Pcm => {
            let bytes_per_sec = u64::from(defaults::PCM_SAMPLE_RATE) * 2;
            AudioInfo {
                decodable: total_len >= 2,
                duration: Some(duration_from_rate(total_len as u64, bytes_per_sec)),
            }
        }
    }
}

/// A WAV prefix is playable once its header parses and at least one full
/// sample frame follows it. Streamed WAV headers often carry a placeholder
/// data length, so the duration comes from the bytes actually present.
fn inspect_wav(head: &[u8], total_len: usize) -> AudioInfo {
    let reader = match hound::WavReader::new(Cursor::new(head)) {
        Ok(reader) => reader,
        Err(_) => return AudioInfo::EMPTY,
    };
    let spec = reader.spec();
    let data_offset = reader.into_inner().position() as usize;
    let available = total_len.saturating_sub(data_offset) as u64;

    let frame_bytes = u64::from(spec.channels) * u64::from(spec.bits_per_sample).div_ceil(8);
    if frame_bytes == 0 || spec.sample_rate == 0 {
        return AudioInfo::EMPTY;
    }

    AudioInfo {
        decodable: available >= frame_bytes,
        duration: Some(duration_from_rate(
            available,
            u64::from(spec.sample_rate) * frame_bytes,
        )),
    }
}

fn duration_from_rate(bytes: u64, bytes_per_sec: u64) -> Duration {
    if bytes_per_sec == 0 {
        return Duration::ZERO;
    }
    Duration::from_micros(bytes.saturating_mul(1_000_000) / bytes_per_sec)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a 16-bit mono WAV file with `samples` samples of silence.
    pub(crate) fn wav_bytes(sample_rate: u32, samples: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for _ in 0..samples {
                writer.write_sample(0i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("wav".parse::<AudioFormat>(), Ok(AudioFormat::Wav));
        assert_eq!("MP3".parse::<AudioFormat>(), Ok(AudioFormat::Mp3));
        assert_eq!("audio/L16".parse::<AudioFormat>(), Ok(AudioFormat::Pcm));
        assert!("flac".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(AudioFormat::Wav.mime(), "audio/wav");
        assert_eq!(AudioFormat::Mp3.mime(), "audio/mpeg");
        assert_eq!(AudioFormat::Pcm.mime(), "audio/L16");
    }

    #[test]
    fn test_empty_buffer_is_never_decodable() {
        for format in [AudioFormat::Wav, AudioFormat::Mp3, AudioFormat::Pcm] {
            assert!(!inspect(format, &[]).decodable, "{format} should not decode");
        }
    }

    #[test]
    fn test_complete_wav_duration() {
        let bytes = wav_bytes(16_000, 16_000);
        let info = inspect(AudioFormat::Wav, &bytes);

        assert!(info.decodable);
        assert_eq!(info.duration, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_wav_header_only_is_not_decodable() {
        let bytes = wav_bytes(16_000, 0);
        let info = inspect(AudioFormat::Wav, &bytes);
        assert!(!info.decodable);
    }

    #[test]
    fn test_truncated_wav_header_is_not_decodable() {
        let bytes = wav_bytes(16_000, 100);
        assert!(!inspect(AudioFormat::Wav, &bytes[..20]).decodable);
    }

    #[test]
    fn test_partial_wav_counts_only_present_samples() {
        let bytes = wav_bytes(8_000, 8_000);
        let header = bytes.len() - 8_000 * 2;
        // Keep a quarter second of samples.
        let partial = &bytes[..header + 4_000];
        let info = inspect(AudioFormat::Wav, partial);

        assert!(info.decodable);
        assert_eq!(info.duration, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_head_inspection_matches_whole_buffer() {
        let bytes = wav_bytes(8_000, 8_000);
        let head = &bytes[..HEADER_BYTES];

        assert_eq!(
            inspect_head(AudioFormat::Wav, head, bytes.len()),
            inspect(AudioFormat::Wav, &bytes)
        );
        assert_eq!(
            inspect_head(AudioFormat::Wav, head, bytes.len()).duration,
            Some(Duration::from_secs(1))
        );
    }

    #[test]
    fn test_mp3_duration_is_estimated_from_size() {
        let info = inspect(AudioFormat::Mp3, &vec![0u8; 16_000]);
        assert!(info.decodable);
        assert_eq!(info.duration, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_pcm_needs_a_whole_sample() {
        assert!(!inspect(AudioFormat::Pcm, &[1]).decodable);
        assert!(inspect(AudioFormat::Pcm, &[1, 2]).decodable);
    }
}
