//! One playback of a recorded file.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::error::SessionError;
use crate::device::{AudioBackend, DeviceError, DeviceWorker, PlaybackDevice, PlaybackEvents};

/// Lifecycle of a [`PlaybackSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl PlayerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlayerState::Completed | PlayerState::Stopped | PlayerState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Completed => "completed",
            PlayerState::Stopped => "stopped",
            PlayerState::Failed => "failed",
        }
    }
}

/// How a playback that started successfully came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// The file played through to its natural end.
    Completed,
    /// The caller stopped it, or the session was discarded.
    Stopped,
}

type CompletionResult = Result<PlaybackOutcome, SessionError>;

/// Pending result of a started playback.
///
/// Resolves exactly once: with `Completed` at end of stream, with `Stopped`
/// after an explicit stop, or with `ERROR_PLAYING_FILE` if the stream fails.
#[derive(Debug)]
pub struct PlaybackCompletion {
    rx: oneshot::Receiver<CompletionResult>,
}

impl Future for PlaybackCompletion {
    type Output = CompletionResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| result.unwrap_or(Ok(PlaybackOutcome::Stopped)))
    }
}

/// Owns one playback device handle.
pub struct PlaybackSession {
    state: PlayerState,
    source_path: Option<PathBuf>,
    last_known_position_ms: u32, // Captured on pause, restored on resume
    duration_ms: Option<u32>,
    device: Option<DeviceWorker<dyn PlaybackDevice>>,
    completion: Option<oneshot::Sender<CompletionResult>>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self { state: PlayerState::Idle, source_path: None, last_known_position_ms: 0, duration_ms: None, device: None, completion: None }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn last_known_position_ms(&self) -> u32 {
        self.last_known_position_ms
    }

    /// Open `source` on the output device and start playing it.
    ///
    /// # Arguments
    /// * `backend` - Host audio backend that opens the playback device
    /// * `source` - File to play; must exist
    /// * `events` - Where the device reports end of stream and faults
    ///
    /// # Returns
    /// A [`PlaybackCompletion`] that resolves when this playback ends.
    ///
    /// # Errors
    /// `FILE_NOT_FOUND` before any device is opened, `ERROR_PLAYING_FILE` for
    /// device faults (the session fails and the handle is released).
    pub async fn start(&mut self, backend: Arc<dyn AudioBackend>, source: &Path, events: PlaybackEvents) -> Result<PlaybackCompletion, SessionError> {
        if self.state != PlayerState::Idle {
            return Err(self.rejection("start"));
        }

        if !backend.file_exists(source) {
            return Err(SessionError::FileNotFound(source.to_path_buf()));
        }

        if let Some(previous) = self.device.take() {
            debug!("Releasing stale playback handle before start");
            if let Err(e) = previous.release().await {
                warn!("Stale playback handle release: {}", e);
            }
        }

        let path = source.to_path_buf();
        self.source_path = Some(path.clone());

        let worker = match DeviceWorker::open("voice-notes-playback", move || backend.open_playback(&path, events)).await {
            Ok(worker) => worker,
            Err(e) => return Err(self.fail_start(e)),
        };

        let started = worker
            .try_call(|d| {
                let duration = d.duration_ms()?;
                d.play()?;
                Ok(duration)
            })
            .await;

        let duration = match started {
            Ok(duration) => duration,
            Err(e) => {
                if let Err(release_err) = worker.release().await {
                    warn!("Playback device release after failed start: {}", release_err);
                }
                return Err(self.fail_start(e));
            }
        };

        let (tx, rx) = oneshot::channel();
        self.device = Some(worker);
        self.completion = Some(tx);
        self.duration_ms = Some(duration);
        self.last_known_position_ms = 0;
        self.state = PlayerState::Playing;

        info!("Playing {} ({} ms)", source.display(), duration);
        Ok(PlaybackCompletion { rx })
    }

    /// Pause playback, remembering where it stopped.
    pub async fn pause(&mut self) -> Result<(), SessionError> {
        let Some(device) = &self.device else {
            return Err(SessionError::PlayerNotInitialized);
        };

        if self.state != PlayerState::Playing {
            return Err(SessionError::NotPlaying);
        }

        // Check, read and pause in one job so nothing runs on the device in between.
        let paused = device
            .try_call(|d| {
                if !d.is_playing() {
                    return Ok(None);
                }
                let position = d.position_ms()?;
                d.pause()?;
                Ok(Some(position))
            })
            .await;

        match paused {
            Ok(Some(position)) => {
                self.last_known_position_ms = self.clamp_position(position);
                self.state = PlayerState::Paused;
                debug!("Playback paused at {} ms", self.last_known_position_ms);
                Ok(())
            }
            Ok(None) => Err(SessionError::NotPlaying),
            Err(e) => {
                self.fail_if_gone(&e);
                Err(SessionError::PausingFile(e))
            }
        }
    }

    /// Continue from the position captured by [`pause`](Self::pause).
    pub async fn resume(&mut self) -> Result<(), SessionError> {
        let Some(device) = &self.device else {
            return Err(SessionError::PlayerNotInitialized);
        };

        if self.state != PlayerState::Paused {
            return Err(self.rejection("resume"));
        }

        let position = self.last_known_position_ms;
        let resumed = device
            .try_call(move |d| {
                d.seek_to(position)?;
                d.play()
            })
            .await;

        if let Err(e) = resumed {
            self.fail_if_gone(&e);
            return Err(SessionError::ResumingFile(e));
        }

        self.state = PlayerState::Playing;
        debug!("Playback resumed at {} ms", position);
        Ok(())
    }

    pub async fn duration(&mut self) -> Result<u32, SessionError> {
        let Some(device) = &self.device else {
            return Err(SessionError::PlayerNotInitialized);
        };

        let duration = device.try_call(|d| d.duration_ms()).await;
        match duration {
            Ok(duration) => {
                self.duration_ms = Some(duration);
                Ok(duration)
            }
            Err(e) => {
                self.fail_if_gone(&e);
                Err(SessionError::GettingDuration(e))
            }
        }
    }

    pub async fn current_position(&mut self) -> Result<u32, SessionError> {
        let Some(device) = &self.device else {
            return Err(SessionError::PlayerNotInitialized);
        };

        let position = device.try_call(|d| d.position_ms()).await;
        position.map_err(|e| {
            self.fail_if_gone(&e);
            SessionError::GettingCurrentPosition(e)
        })
    }

    /// Move the play head. The device clamps out-of-range positions.
    ///
    /// # Returns
    /// The position the device actually applied.
    pub async fn seek_to(&mut self, position_ms: u32) -> Result<u32, SessionError> {
        let Some(device) = &self.device else {
            return Err(SessionError::PlayerNotInitialized);
        };

        let applied = device
            .try_call(move |d| {
                d.seek_to(position_ms)?;
                d.position_ms()
            })
            .await;

        match applied {
            Ok(applied) => {
                self.last_known_position_ms = self.clamp_position(applied);
                debug!("Seeked to {} ms (requested {} ms)", applied, position_ms);
                Ok(applied)
            }
            Err(e) => {
                self.fail_if_gone(&e);
                Err(SessionError::Seeking(e))
            }
        }
    }

    /// Whether the device is producing sound right now.
    pub async fn is_playing(&self) -> bool {
        match &self.device {
            Some(device) => device.call(|d| d.is_playing()).await.unwrap_or(false),
            None => false,
        }
    }

    /// End playback early. The pending completion resolves with `Stopped`.
    ///
    /// The handle is released even if the device refuses to halt; the session
    /// then ends up `Failed`.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            return Err(self.rejection("stop"));
        }

        let halted = match &self.device {
            Some(device) => {
                device
                    .try_call(|d| {
                        let position = d.position_ms()?;
                        d.pause()?;
                        Ok(Some(position))
                    })
                    .await
            }
            None => Ok(None),
        };

        match halted {
            Ok(position) => {
                if let Some(position) = position {
                    self.last_known_position_ms = self.clamp_position(position);
                }
                self.finish(PlayerState::Stopped, Ok(PlaybackOutcome::Stopped)).await;
                info!("Playback stopped at {} ms", self.last_known_position_ms);
                Ok(())
            }
            Err(e) => {
                error!("Failed to stop playback: {}", e);
                self.finish(PlayerState::Failed, Ok(PlaybackOutcome::Stopped)).await;
                Err(SessionError::StoppingPlayback(e))
            }
        }
    }

    /// Apply a natural end of stream reported by the device.
    ///
    /// Returns `false` if the session had already ended.
    pub async fn complete(&mut self) -> bool {
        if self.state.is_terminal() || self.state == PlayerState::Idle {
            return false;
        }

        self.last_known_position_ms = 0;
        self.finish(PlayerState::Completed, Ok(PlaybackOutcome::Completed)).await;
        info!("Playback completed");
        true
    }

    /// Apply a stream fault reported by the device.
    pub async fn fault(&mut self, error: DeviceError) -> bool {
        if self.state.is_terminal() || self.state == PlayerState::Idle {
            return false;
        }

        error!("Playback failed: {}", error);
        self.finish(PlayerState::Failed, Err(SessionError::PlayingFile(error))).await;
        true
    }

    async fn finish(&mut self, state: PlayerState, outcome: CompletionResult) {
        if let Some(device) = self.device.take()
            && let Err(e) = device.release().await
        {
            warn!("Playback device release: {}", e);
        }

        self.state = state;
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }

    fn clamp_position(&self, position_ms: u32) -> u32 {
        self.duration_ms.map_or(position_ms, |duration| position_ms.min(duration))
    }

    fn rejection(&self, operation: &'static str) -> SessionError {
        match self.state {
            PlayerState::Idle => SessionError::PlayerNotInitialized,
            state => SessionError::InvalidState { session: "player", operation, state: state.as_str() },
        }
    }

    fn fail_start(&mut self, e: DeviceError) -> SessionError {
        self.state = PlayerState::Failed;
        error!("Failed to play {}: {}", self.source_path.as_deref().unwrap_or(Path::new("")).display(), e);
        SessionError::PlayingFile(e)
    }

    fn fail_if_gone(&mut self, e: &DeviceError) {
        if matches!(e, DeviceError::WorkerGone) {
            self.device = None;
            self.state = PlayerState::Failed;
            if let Some(tx) = self.completion.take() {
                let _ = tx.send(Err(SessionError::PlayingFile(DeviceError::WorkerGone)));
            }
            error!("Playback device lost");
        }
    }
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self::new()
    }
}
