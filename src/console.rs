//! Interactive terminal front end for recording and playback.
//!
//! Commands are read line by line from stdin while a session runs. The level
//! meter and play head are drawn on stderr so that stdout only carries the
//! recording metadata.

use std::future::Future;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use voice_notes::audio::util::MAX_LEVEL;
use voice_notes::session::{ErrorKind, PlaybackOutcome, SessionError, SessionManager};

/// Width of the level meter in characters.
const METER_WIDTH: usize = 30;

/// A line typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Stop,
    Status,
    Seek(u32),
}

impl ConsoleCommand {
    /// Parse a command line. Returns `None` for blank or unknown input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match words.next()?.to_ascii_lowercase().as_str() {
            "pause" | "p" => Self::Pause,
            "resume" | "r" => Self::Resume,
            "stop" | "s" | "q" => Self::Stop,
            "status" => Self::Status,
            "seek" => Self::Seek(words.next()?.parse().ok()?),
            _ => return None,
        };
        Some(command)
    }
}

/// Metadata emitted once a recording has been finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub file_path: String,
    pub name: String,
    pub created_at: String,
}

impl RecordingMetadata {
    fn new(path: &Path, name: &str) -> Result<Self> {
        let created_at = OffsetDateTime::now_utc().format(&Rfc3339).context("Failed to format creation time")?;
        Ok(Self { file_path: path.display().to_string(), name: name.to_string(), created_at })
    }
}

/// Default recording name, `recording_<unix-ms>`.
pub fn default_recording_name() -> String {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or_default();
    format!("recording_{}", millis)
}

/// Format whole seconds as `m:ss`.
pub fn format_timer(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Format a play head position as `m:ss`, rounding to the nearest second.
pub fn format_position(position_ms: u32) -> String {
    format_timer((position_ms as u64 + 500) / 1000)
}

/// Render an input level as a fixed-width bar.
pub fn format_meter(level: i32) -> String {
    let level = level.clamp(0, MAX_LEVEL as i32) as usize;
    let filled = level * METER_WIDTH / MAX_LEVEL as usize;
    format!("[{}{}]", "#".repeat(filled), " ".repeat(METER_WIDTH - filled))
}

fn redraw(line: &str) {
    let mut stderr = std::io::stderr();
    let _ = write!(stderr, "\r{}\x1b[K", line);
    let _ = stderr.flush();
}

fn report(action: &str, result: Result<(), SessionError>) {
    match result {
        Ok(()) => info!("{}", action),
        Err(e) => warn!("{} failed [{}]: {}", action, e.kind(), e),
    }
}

/// Stdin lines, read on a dedicated thread so a pending read never holds up exit.
struct CommandInput {
    lines: mpsc::UnboundedReceiver<String>,
}

impl CommandInput {
    fn new() -> Self {
        let (tx, lines) = mpsc::unbounded_channel();
        let spawned = std::thread::Builder::new().name("voice-notes-stdin".to_string()).spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        return;
                    }
                }
            }
            debug!("stdin closed, commands disabled");
        });
        if let Err(e) = spawned {
            warn!("Commands unavailable: {}", e);
        }
        Self { lines }
    }

    /// Next line; pends forever once stdin has closed.
    async fn next(&mut self) -> Option<String> {
        match self.lines.recv().await {
            Some(line) => Some(line),
            None => std::future::pending().await,
        }
    }
}

/// Record a voice note until `stop`, the time limit or `shutdown`.
///
/// # Arguments
/// * `manager` - Session manager owning the capture device
/// * `name` - Recording name; defaults to `recording_<unix-ms>`
/// * `max_seconds` - Optional limit on captured (not paused) time
/// * `meter_interval` - Level sampling cadence
/// * `shutdown` - Resolves on Ctrl+C or SIGTERM
///
/// # Returns
/// Metadata of the finalized recording, also printed to stdout as JSON.
pub async fn record(manager: &SessionManager, name: Option<String>, max_seconds: Option<u64>, meter_interval: Duration, shutdown: impl Future<Output = ()>) -> Result<RecordingMetadata> {
    let name = name.unwrap_or_else(default_recording_name);
    let path = manager.start_recording(&name).await.context("Failed to start recording")?;
    info!("🔴 Recording to {}", path.display());
    info!("Commands: pause, resume, stop, status");

    let limit = max_seconds.map(Duration::from_secs);
    let mut meter = tokio::time::interval(meter_interval);
    meter.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut input = CommandInput::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = meter.tick() => {
                let elapsed = manager.recording_elapsed().await.unwrap_or_default();
                if limit.is_some_and(|limit| elapsed >= limit) {
                    info!("Maximum duration reached");
                    break;
                }
                match manager.get_amplitude().await {
                    Ok(level) => redraw(&format!("{} {}", format_timer(elapsed.as_secs()), format_meter(level))),
                    // Not capturing (paused)
                    Err(e) if e.kind() == ErrorKind::RecorderNotInitialized => {}
                    Err(e) => warn!("Failed to read input level: {}", e),
                }
            }
            Some(line) = input.next() => match ConsoleCommand::parse(&line) {
                Some(ConsoleCommand::Pause) => report("Recording paused", manager.pause_recording().await),
                Some(ConsoleCommand::Resume) => report("Recording resumed", manager.resume_recording().await),
                Some(ConsoleCommand::Stop) => break,
                Some(ConsoleCommand::Status) => {
                    let elapsed = manager.recording_elapsed().await.unwrap_or_default();
                    let history = manager.amplitude_history().await;
                    let peak = history.iter().copied().max().unwrap_or(0);
                    info!("Elapsed {}, peak level {} over the last {} samples", format_timer(elapsed.as_secs()), peak, history.len());
                }
                Some(ConsoleCommand::Seek(_)) => warn!("seek is only available during playback"),
                None => warn!("Unknown command: {}", line.trim()),
            },
        }
    }
    eprintln!();

    manager.stop_recording().await.context("Failed to stop recording")?;
    let path = manager.get_output_file().await?;
    let metadata = RecordingMetadata::new(&path, &name)?;
    info!("⏹️ Saved {}", metadata.file_path);
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(metadata)
}

/// Play `file` until it ends, `stop` is typed or `shutdown` resolves.
///
/// # Returns
/// How playback ended.
pub async fn play(manager: &SessionManager, file: PathBuf, refresh_interval: Duration, shutdown: impl Future<Output = ()>) -> Result<PlaybackOutcome> {
    let completion = manager.start_playing(&file).await.with_context(|| format!("Failed to play {}", file.display()))?;
    let duration = manager.get_duration().await?;
    info!("▶️ Playing {} ({})", file.display(), format_position(duration));
    info!("Commands: pause, resume, stop, seek <ms>, status");

    let mut ticker = tokio::time::interval(refresh_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut input = CommandInput::new();
    tokio::pin!(completion);
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            outcome = &mut completion => break outcome?,
            _ = &mut shutdown => {
                if let Err(e) = manager.stop_playing().await {
                    debug!("Playback already ended: {}", e);
                }
                break PlaybackOutcome::Stopped;
            }
            _ = ticker.tick() => {
                if manager.is_playing().await
                    && let Ok(position) = manager.get_current_position().await
                {
                    redraw(&format!("{} / {}", format_position(position), format_position(duration)));
                }
            }
            Some(line) = input.next() => match ConsoleCommand::parse(&line) {
                Some(ConsoleCommand::Pause) => report("Playback paused", manager.pause_playing().await),
                Some(ConsoleCommand::Resume) => report("Playback resumed", manager.resume_playing().await),
                Some(ConsoleCommand::Stop) => report("Playback stopped", manager.stop_playing().await),
                Some(ConsoleCommand::Seek(ms)) => match manager.seek_to(ms).await {
                    Ok(applied) => info!("Seeked to {}", format_position(applied)),
                    Err(e) => warn!("Seek failed [{}]: {}", e.kind(), e),
                },
                Some(ConsoleCommand::Status) => {
                    let position = manager.get_current_position().await.unwrap_or_default();
                    let state = if manager.is_playing().await { "playing" } else { "paused" };
                    info!("{} at {} / {}", state, format_position(position), format_position(duration));
                }
                None => warn!("Unknown command: {}", line.trim()),
            },
        }
    };
    eprintln!();

    match outcome {
        PlaybackOutcome::Completed => info!("✅ Playback finished"),
        PlaybackOutcome::Stopped => info!("⏹️ Playback stopped"),
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("pause"), Some(ConsoleCommand::Pause));
        assert_eq!(ConsoleCommand::parse("  RESUME \n"), Some(ConsoleCommand::Resume));
        assert_eq!(ConsoleCommand::parse("q"), Some(ConsoleCommand::Stop));
        assert_eq!(ConsoleCommand::parse("seek 1500"), Some(ConsoleCommand::Seek(1500)));
        assert_eq!(ConsoleCommand::parse("seek"), None);
        assert_eq!(ConsoleCommand::parse("seek -3"), None);
        assert_eq!(ConsoleCommand::parse(""), None);
        assert_eq!(ConsoleCommand::parse("rewind"), None);
    }

    #[test]
    fn test_format_timer() {
        assert_eq!(format_timer(0), "0:00");
        assert_eq!(format_timer(9), "0:09");
        assert_eq!(format_timer(75), "1:15");
        assert_eq!(format_timer(600), "10:00");
    }

    #[test]
    fn test_format_position_rounds_to_nearest_second() {
        assert_eq!(format_position(0), "0:00");
        assert_eq!(format_position(1499), "0:01");
        assert_eq!(format_position(1500), "0:02");
        assert_eq!(format_position(59_600), "1:00");
    }

    #[test]
    fn test_format_meter() {
        assert_eq!(format_meter(0), format!("[{}]", " ".repeat(METER_WIDTH)));
        assert_eq!(format_meter(i32::MAX), format!("[{}]", "#".repeat(METER_WIDTH)));
        assert_eq!(format_meter(-5), format_meter(0));
        assert_eq!(format_meter(MAX_LEVEL as i32 / 2).matches('#').count(), METER_WIDTH / 2 - 1);
    }

    #[test]
    fn test_metadata_serializes_camel_case() {
        let metadata = RecordingMetadata::new(Path::new("/tmp/noteA.wav"), "noteA").unwrap();
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["filePath"], "/tmp/noteA.wav");
        assert_eq!(json["name"], "noteA");
        assert!(json["createdAt"].as_str().is_some_and(|s| s.ends_with('Z')));
    }

    #[test]
    fn test_default_recording_name() {
        let name = default_recording_name();
        assert!(name.starts_with("recording_"));
        assert!(name["recording_".len()..].parse::<u128>().is_ok());
    }
}
