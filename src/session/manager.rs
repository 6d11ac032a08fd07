//! Single admission point for recording and playback commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::playback::{PlaybackCompletion, PlaybackSession};
use super::recording::RecordingSession;
use crate::device::{AudioBackend, DeviceCapabilities, PlaybackEvents, PlaybackSignal};

/// Playback slot plus a generation counter so late device signals from an
/// earlier session are ignored.
#[derive(Default)]
struct PlaybackSlot {
    generation: u64,
    session: Option<PlaybackSession>,
}

/// Routes commands to the active recording and playback sessions.
///
/// Holds at most one recording and one playback. Each kind sits behind its
/// own async mutex held for the whole command, so calls on one session run
/// strictly one after another while recording and playback proceed
/// independently. The last finished session of each kind is kept so callers
/// can still ask for its output file or get its terminal error.
pub struct SessionManager {
    backend: Arc<dyn AudioBackend>,
    capabilities: DeviceCapabilities,
    scratch_dir: PathBuf,
    recording: Mutex<Option<RecordingSession>>,
    playback: Arc<Mutex<PlaybackSlot>>,
}

impl SessionManager {
    /// Create a manager. Device capabilities are queried once, here.
    ///
    /// # Arguments
    /// * `backend` - Host audio backend
    /// * `scratch_dir` - Directory receiving new recordings
    pub fn new(backend: Arc<dyn AudioBackend>, scratch_dir: impl Into<PathBuf>) -> Self {
        let capabilities = backend.capabilities();
        let scratch_dir = scratch_dir.into();
        debug!("Session manager ready: scratch dir {}, pause supported: {}", scratch_dir.display(), capabilities.pause_supported);

        Self { backend, capabilities, scratch_dir, recording: Mutex::new(None), playback: Arc::new(Mutex::new(PlaybackSlot::default())) }
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    // ---- Recording ----

    /// Start a new recording named `output_name`.
    ///
    /// # Returns
    /// The absolute path of the file being written.
    ///
    /// # Errors
    /// `ALREADY_RECORDING` if a recording is live; otherwise whatever
    /// [`RecordingSession::start`] reports.
    pub async fn start_recording(&self, output_name: &str) -> Result<PathBuf, SessionError> {
        let mut slot = self.recording.lock().await;
        if slot.as_ref().is_some_and(|s| !s.state().is_terminal()) {
            return Err(SessionError::AlreadyRecording);
        }

        let mut session = RecordingSession::new(self.capabilities);
        let result = session.start(self.backend.clone(), &self.scratch_dir, output_name).await;

        // A session that never left Idle holds nothing worth keeping.
        if session.state() != super::RecorderState::Idle {
            *slot = Some(session);
        }
        result
    }

    pub async fn pause_recording(&self) -> Result<(), SessionError> {
        let mut slot = self.recording.lock().await;
        slot.as_mut().ok_or(SessionError::RecorderNotInitialized)?.pause().await
    }

    pub async fn resume_recording(&self) -> Result<(), SessionError> {
        let mut slot = self.recording.lock().await;
        slot.as_mut().ok_or(SessionError::RecorderNotInitialized)?.resume().await
    }

    /// Finalize the recording and release the microphone.
    pub async fn stop_recording(&self) -> Result<PathBuf, SessionError> {
        let mut slot = self.recording.lock().await;
        slot.as_mut().ok_or(SessionError::RecorderNotInitialized)?.stop().await
    }

    pub async fn get_output_file(&self) -> Result<PathBuf, SessionError> {
        let slot = self.recording.lock().await;
        slot.as_ref().ok_or(SessionError::NoFile)?.output_file()
    }

    pub async fn get_amplitude(&self) -> Result<i32, SessionError> {
        let mut slot = self.recording.lock().await;
        slot.as_mut().ok_or(SessionError::RecorderNotInitialized)?.amplitude().await
    }

    /// Recent input levels of the current (or last) recording, oldest first.
    pub async fn amplitude_history(&self) -> Vec<i32> {
        let slot = self.recording.lock().await;
        slot.as_ref().map(|s| s.amplitude_history()).unwrap_or_default()
    }

    pub async fn recording_elapsed(&self) -> Result<Duration, SessionError> {
        let slot = self.recording.lock().await;
        slot.as_ref().map(|s| s.elapsed()).ok_or(SessionError::RecorderNotInitialized)
    }

    // ---- Playback ----

    /// Start playing `file_path`.
    ///
    /// Resolves once the device is playing. The returned
    /// [`PlaybackCompletion`] resolves when the playback ends.
    ///
    /// # Errors
    /// `ALREADY_PLAYING` if a playback is live, `FILE_NOT_FOUND` if the file
    /// does not exist, `ERROR_PLAYING_FILE` for device faults.
    pub async fn start_playing(&self, file_path: impl AsRef<Path>) -> Result<PlaybackCompletion, SessionError> {
        let mut slot = self.playback.lock().await;
        if slot.session.as_ref().is_some_and(|s| !s.state().is_terminal()) {
            return Err(SessionError::AlreadyPlaying);
        }

        let (events, signals) = PlaybackEvents::channel();
        let mut session = PlaybackSession::new();
        let result = session.start(self.backend.clone(), file_path.as_ref(), events).await;

        if session.state() != super::PlayerState::Idle {
            slot.generation += 1;
            slot.session = Some(session);
        }

        if result.is_ok() {
            tokio::spawn(watch_playback(self.playback.clone(), slot.generation, signals));
        }
        result
    }

    pub async fn pause_playing(&self) -> Result<(), SessionError> {
        let mut slot = self.playback.lock().await;
        slot.session.as_mut().ok_or(SessionError::PlayerNotInitialized)?.pause().await
    }

    pub async fn resume_playing(&self) -> Result<(), SessionError> {
        let mut slot = self.playback.lock().await;
        slot.session.as_mut().ok_or(SessionError::PlayerNotInitialized)?.resume().await
    }

    /// End the current playback early.
    pub async fn stop_playing(&self) -> Result<(), SessionError> {
        let mut slot = self.playback.lock().await;
        slot.session.as_mut().ok_or(SessionError::PlayerNotInitialized)?.stop().await
    }

    pub async fn get_duration(&self) -> Result<u32, SessionError> {
        let mut slot = self.playback.lock().await;
        slot.session.as_mut().ok_or(SessionError::PlayerNotInitialized)?.duration().await
    }

    pub async fn get_current_position(&self) -> Result<u32, SessionError> {
        let mut slot = self.playback.lock().await;
        slot.session.as_mut().ok_or(SessionError::PlayerNotInitialized)?.current_position().await
    }

    /// Seek the current playback.
    ///
    /// # Returns
    /// The position the device applied after clamping.
    pub async fn seek_to(&self, position_ms: u32) -> Result<u32, SessionError> {
        let mut slot = self.playback.lock().await;
        slot.session.as_mut().ok_or(SessionError::PlayerNotInitialized)?.seek_to(position_ms).await
    }

    pub async fn is_playing(&self) -> bool {
        let slot = self.playback.lock().await;
        match &slot.session {
            Some(session) => session.is_playing().await,
            None => false,
        }
    }

    /// Stop every live session, releasing all device handles.
    pub async fn shutdown(&self) {
        {
            let mut slot = self.recording.lock().await;
            if let Some(session) = slot.as_mut().filter(|s| !s.state().is_terminal()) {
                match session.stop().await {
                    Ok(path) => info!("Recording saved on shutdown: {}", path.display()),
                    Err(e) => warn!("Recording stop on shutdown: {}", e),
                }
            }
        }

        let mut slot = self.playback.lock().await;
        if let Some(session) = slot.session.as_mut().filter(|s| !s.state().is_terminal())
            && let Err(e) = session.stop().await
        {
            warn!("Playback stop on shutdown: {}", e);
        }
    }
}

/// Apply device signals for one playback generation until it ends.
async fn watch_playback(playback: Arc<Mutex<PlaybackSlot>>, generation: u64, mut signals: mpsc::UnboundedReceiver<PlaybackSignal>) {
    while let Some(signal) = signals.recv().await {
        let mut slot = playback.lock().await;
        if slot.generation != generation {
            break;
        }
        let Some(session) = slot.session.as_mut() else {
            break;
        };

        let ended = match signal {
            PlaybackSignal::EndOfStream => session.complete().await,
            PlaybackSignal::Fault(e) => session.fault(e).await,
        };
        if ended || session.state().is_terminal() {
            break;
        }
    }
    debug!("Playback watcher {} finished", generation);
}
