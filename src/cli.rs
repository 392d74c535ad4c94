//! Command-line interface for narrastream
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Streaming speech synthesis and narrated playback
#[derive(Parser, Debug)]
#[command(
    name = "narrastream",
    version,
    about = "Streaming speech synthesis and narrated playback"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: progress details, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Server base URL (overrides config and NARRASTREAM_BASE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Synthesize text over the streaming endpoint and play it as it arrives
    Speak {
        /// Text to synthesize
        text: String,

        /// Synthesis provider (e.g., baidu, douyin, xunfei)
        #[arg(long, value_name = "PROVIDER")]
        provider: Option<String>,

        /// Voice name understood by the provider
        #[arg(long, value_name = "VOICE")]
        voice: Option<String>,

        /// Audio format to request (wav, mp3, pcm)
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,

        /// Write the complete audio to this file
        #[arg(long, short = 'o', value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Generate and play the narration of a slide document, page by page
    Narrate {
        /// Document identifier on the server
        document_id: String,

        /// Play audio that already exists instead of generating it
        #[arg(long, conflicts_with = "regenerate")]
        skip_generate: bool,

        /// Delete existing narration audio before generating
        #[arg(long)]
        regenerate: bool,

        /// Narration style passed to the generator
        #[arg(long, value_name = "STYLE")]
        style: Option<String>,

        /// Page to start from (1-based)
        #[arg(long, value_name = "PAGE", default_value = "1")]
        from_page: u32,

        /// Give up if narration is not ready in time. Examples: 90s, 5m
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        timeout: Option<Duration>,
    },

    /// Show narration status of a document
    Status {
        /// Document identifier on the server
        document_id: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Parse a duration string.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`) and compound (`1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_speak_parses_text_and_output() {
        let cli = Cli::try_parse_from(["narrastream", "speak", "你好世界", "-o", "out.wav"]).unwrap();
        match cli.command {
            Commands::Speak { text, output, .. } => {
                assert_eq!(text, "你好世界");
                assert_eq!(output, Some(PathBuf::from("out.wav")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_narrate_timeout_accepts_humantime() {
        let cli = Cli::try_parse_from(["narrastream", "narrate", "doc-1", "--timeout", "1m30s"])
            .unwrap();
        match cli.command {
            Commands::Narrate {
                document_id,
                timeout,
                from_page,
                ..
            } => {
                assert_eq!(document_id, "doc-1");
                assert_eq!(timeout, Some(Duration::from_secs(90)));
                assert_eq!(from_page, 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_skip_generate_conflicts_with_regenerate() {
        let result = Cli::try_parse_from([
            "narrastream",
            "narrate",
            "doc-1",
            "--skip-generate",
            "--regenerate",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "narrastream",
            "status",
            "doc-1",
            "-vv",
            "--base-url",
            "http://10.0.0.2:8000",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.base_url.as_deref(), Some("http://10.0.0.2:8000"));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("45"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert!(parse_duration("soon").is_err());
    }
}
