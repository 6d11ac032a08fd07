//! Application configuration and CLI argument parsing.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;

use voice_notes::session::DEFAULT_SAMPLE_INTERVAL_MS;

/// Bounds accepted for `--sample-rate`.
const SAMPLE_RATE_RANGE: std::ops::RangeInclusive<u32> = 8000..=192000;

/// Bounds accepted for `--meter-interval-ms`.
const METER_INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 20..=5000;

/// What the binary does once configured.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Record a voice note from the default microphone
    Record {
        /// Recording name; the container extension is appended
        name: Option<String>,

        /// Stop automatically after this many seconds
        #[arg(long)]
        max_seconds: Option<u64>,
    },

    /// Play an audio file through the default output device
    Play {
        /// File to play
        file: PathBuf,
    },
}

/// Voice notes application configuration.
#[derive(Parser, Debug, Clone, Serialize, Deserialize)]
#[command(name = "voice-notes")]
#[command(author, version, about = "Record and play back voice notes", long_about = None)]
pub struct AppConfig {
    /// Directory where recordings are written
    #[arg(long, short = 'd', env = "VOICE_NOTES_DIR", default_value_os_t = default_scratch_dir(), global = true)]
    pub scratch_dir: PathBuf,

    /// Preferred capture sample rate (the closest supported rate is used otherwise)
    #[arg(long, default_value = "44100", global = true)]
    pub sample_rate: u32,

    /// Interval between input level samples while recording
    #[arg(long, default_value_t = DEFAULT_SAMPLE_INTERVAL_MS, global = true)]
    pub meter_interval_ms: u64,

    /// Treat the host as unable to pause and resume recordings
    #[arg(long, global = true)]
    pub no_pause: bool,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl AppConfig {
    /// Whether recordings may be paused and resumed.
    pub fn pause_supported(&self) -> bool {
        !self.no_pause
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if !SAMPLE_RATE_RANGE.contains(&self.sample_rate) {
            anyhow::bail!("Sample rate must be between {} and {} Hz, got {}", SAMPLE_RATE_RANGE.start(), SAMPLE_RATE_RANGE.end(), self.sample_rate);
        }

        if !METER_INTERVAL_RANGE.contains(&self.meter_interval_ms) {
            anyhow::bail!(
                "Meter interval must be between {} and {} ms, got {}",
                METER_INTERVAL_RANGE.start(),
                METER_INTERVAL_RANGE.end(),
                self.meter_interval_ms
            );
        }

        if self.scratch_dir.exists() && !self.scratch_dir.is_dir() {
            anyhow::bail!("Scratch path is not a directory: {}", self.scratch_dir.display());
        }

        match &self.command {
            Command::Record { max_seconds: Some(0), .. } => anyhow::bail!("--max-seconds must be positive"),
            Command::Play { file } if !file.is_file() => anyhow::bail!("File not found: {}", file.display()),
            _ => Ok(()),
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Scratch directory: {}", self.scratch_dir.display());
        info!("  Sample rate: {} Hz", self.sample_rate);
        info!("  Meter interval: {}ms", self.meter_interval_ms);
        info!("  Pause supported: {}", self.pause_supported());
        match &self.command {
            Command::Record { name, max_seconds } => {
                info!("  Mode: record");
                if let Some(name) = name {
                    info!("  Name: {}", name);
                }
                if let Some(secs) = max_seconds {
                    info!("  Max duration: {}s", secs);
                }
            }
            Command::Play { file } => {
                info!("  Mode: play");
                info!("  File: {}", file.display());
            }
        }
    }
}

/// Get the default scratch directory (the user cache dir, e.g. ~/.cache/voice-notes).
fn default_scratch_dir() -> PathBuf {
    if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("voice-notes")
    } else {
        std::env::temp_dir().join("voice-notes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        AppConfig::try_parse_from(std::iter::once("voice-notes").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["record"]);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.meter_interval_ms, 100);
        assert!(config.pause_supported());
        assert!(!config.verbose);
        assert!(config.scratch_dir.ends_with("voice-notes"));
        assert_eq!(config.command, Command::Record { name: None, max_seconds: None });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let config = parse(&["record", "noteA", "--max-seconds", "30", "--no-pause", "-d", "/tmp/notes", "-v"]);
        assert_eq!(config.command, Command::Record { name: Some("noteA".to_string()), max_seconds: Some(30) });
        assert!(!config.pause_supported());
        assert!(config.verbose);
        assert_eq!(config.scratch_dir, PathBuf::from("/tmp/notes"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        assert!(parse(&["--sample-rate", "1000", "record"]).validate().is_err());
        assert!(parse(&["--meter-interval-ms", "0", "record"]).validate().is_err());
        assert!(parse(&["record", "--max-seconds", "0"]).validate().is_err());
        assert!(parse(&["play", "/definitely/not/here.wav"]).validate().is_err());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(AppConfig::try_parse_from(["voice-notes"]).is_err());
    }
}
