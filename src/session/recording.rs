//! One microphone capture, from start to a finalized file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::amplitude::AmplitudeSampler;
use super::error::SessionError;
use crate::device::{AudioBackend, CaptureDevice, DeviceCapabilities, DeviceError, DeviceWorker};

/// Lifecycle of a [`RecordingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopped,
    Failed,
}

impl RecorderState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecorderState::Stopped | RecorderState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopped => "stopped",
            RecorderState::Failed => "failed",
        }
    }
}

/// Capture time with paused spans excluded.
#[derive(Debug, Default)]
struct CaptureClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl CaptureClock {
    fn run(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    fn hold(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        self.accumulated + self.running_since.map(|since| since.elapsed()).unwrap_or_default()
    }
}

/// Owns one capture device handle and the file it writes.
///
/// A session is never reused: once it reaches `Stopped` or `Failed` the
/// manager creates a fresh one for the next recording.
pub struct RecordingSession {
    state: RecorderState,
    output_path: Option<PathBuf>,      // Set on start, never changed afterwards
    device: Option<DeviceWorker<dyn CaptureDevice>>,
    sampler: AmplitudeSampler,
    captured: bool,                    // Capture actually began on the device
    pause_supported: bool,
    clock: CaptureClock,
}

impl RecordingSession {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self {
            state: RecorderState::Idle,
            output_path: None,
            device: None,
            sampler: AmplitudeSampler::new(),
            captured: false,
            pause_supported: capabilities.pause_supported,
            clock: CaptureClock::default(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Open the microphone and start capturing into `<scratch_dir>/<output_name>.<ext>`.
    ///
    /// # Arguments
    /// * `backend` - Host audio backend that opens the capture device
    /// * `scratch_dir` - Directory receiving the recording (created if missing)
    /// * `output_name` - File stem; must not be empty or contain path separators
    ///
    /// # Returns
    /// The absolute path of the file being written.
    ///
    /// # Errors
    /// `ERROR_STARTING_RECORDING` for a bad name (session stays idle) or any
    /// device fault (session fails).
    pub async fn start(&mut self, backend: Arc<dyn AudioBackend>, scratch_dir: &Path, output_name: &str) -> Result<PathBuf, SessionError> {
        if self.state != RecorderState::Idle {
            return Err(self.rejection("start"));
        }

        if output_name.trim().is_empty() || output_name.contains(['/', '\\']) {
            return Err(SessionError::InvalidName(output_name.to_string()));
        }

        let file_name = format!("{}.{}", output_name, backend.container_extension());
        let path = std::path::absolute(scratch_dir.join(file_name)).map_err(|e| SessionError::StartingRecording(e.into()))?;
        self.output_path = Some(path.clone());

        if let Err(e) = tokio::fs::create_dir_all(scratch_dir).await {
            return Err(self.fail_start(DeviceError::Io(e)));
        }

        let opener_path = path.clone();
        let worker = match DeviceWorker::open("voice-notes-capture", move || backend.open_capture(&opener_path)).await {
            Ok(worker) => worker,
            Err(e) => return Err(self.fail_start(e)),
        };

        if let Err(e) = worker.try_call(|d| d.start()).await {
            if let Err(release_err) = worker.release().await {
                warn!("Capture device release after failed start: {}", release_err);
            }
            return Err(self.fail_start(e));
        }

        self.device = Some(worker);
        self.captured = true;
        self.state = RecorderState::Recording;
        self.clock.run();

        info!("Recording started: {}", path.display());
        Ok(path)
    }

    /// Suspend capture. Requires `Recording` and a host that supports pausing.
    pub async fn pause(&mut self) -> Result<(), SessionError> {
        let device = match (self.state, &self.device) {
            (RecorderState::Recording, Some(device)) => device,
            _ => return Err(self.rejection("pause")),
        };

        if !self.pause_supported {
            return Err(SessionError::PauseUnsupported);
        }

        if let Err(e) = device.try_call(|d| d.pause()).await {
            self.fail_if_gone(&e);
            return Err(SessionError::Pause(e));
        }

        self.clock.hold();
        self.state = RecorderState::Paused;
        debug!("Recording paused at {:?}", self.clock.elapsed());
        Ok(())
    }

    /// Continue a paused capture.
    pub async fn resume(&mut self) -> Result<(), SessionError> {
        let device = match (self.state, &self.device) {
            (RecorderState::Paused, Some(device)) => device,
            _ => return Err(self.rejection("resume")),
        };

        if !self.pause_supported {
            return Err(SessionError::ResumeUnsupported);
        }

        if let Err(e) = device.try_call(|d| d.resume()).await {
            self.fail_if_gone(&e);
            return Err(SessionError::Resume(e));
        }

        self.clock.run();
        self.state = RecorderState::Recording;
        debug!("Recording resumed");
        Ok(())
    }

    /// Finalize the file and release the device.
    ///
    /// The handle is released even when finalizing fails; in that case the
    /// session ends up `Failed`.
    pub async fn stop(&mut self) -> Result<PathBuf, SessionError> {
        if !matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            return Err(self.rejection("stop"));
        }

        let (Some(device), Some(path)) = (self.device.take(), self.output_path.clone()) else {
            self.state = RecorderState::Failed;
            return Err(SessionError::RecorderNotInitialized);
        };

        let finalized = device.try_call(|d| d.stop()).await;
        if let Err(e) = device.release().await {
            warn!("Capture device release: {}", e);
        }
        self.clock.hold();

        match finalized {
            Ok(()) => {
                self.state = RecorderState::Stopped;
                info!("Recording stopped after {:.1}s, file saved at: {}", self.clock.elapsed().as_secs_f32(), path.display());
                Ok(path)
            }
            Err(e) => {
                self.state = RecorderState::Failed;
                error!("Failed to finalize {}: {}", path.display(), e);
                Err(SessionError::StoppingRecording(e))
            }
        }
    }

    /// Path of the file produced by this session, once capture has begun.
    pub fn output_file(&self) -> Result<PathBuf, SessionError> {
        match &self.output_path {
            Some(path) if self.captured => Ok(path.clone()),
            _ => Err(SessionError::NoFile),
        }
    }

    /// Sample the current input level. Only valid while recording.
    pub async fn amplitude(&mut self) -> Result<i32, SessionError> {
        let device = match (self.state, &self.device) {
            (RecorderState::Recording, Some(device)) => device,
            _ => return Err(SessionError::RecorderNotInitialized),
        };

        let sampled = self.sampler.sample(device).await;
        match sampled {
            Ok(value) => Ok(value),
            Err(e) => {
                self.fail_if_gone(&e);
                Err(SessionError::GettingAmplitude(e))
            }
        }
    }

    /// Recent levels, oldest first.
    pub fn amplitude_history(&self) -> Vec<i32> {
        self.sampler.history()
    }

    /// Time spent capturing, paused spans excluded.
    pub fn elapsed(&self) -> Duration {
        self.clock.elapsed()
    }

    fn rejection(&self, operation: &'static str) -> SessionError {
        match self.state {
            RecorderState::Idle => SessionError::RecorderNotInitialized,
            state => SessionError::InvalidState { session: "recorder", operation, state: state.as_str() },
        }
    }

    fn fail_start(&mut self, e: DeviceError) -> SessionError {
        self.state = RecorderState::Failed;
        error!("Failed to start recording: {}", e);
        SessionError::StartingRecording(e)
    }

    // A dead worker already dropped the device, so the handle is gone for good.
    fn fail_if_gone(&mut self, e: &DeviceError) {
        if matches!(e, DeviceError::WorkerGone) {
            self.device = None;
            self.clock.hold();
            self.state = RecorderState::Failed;
            error!("Capture device lost");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::FakeBackend;
    use crate::session::error::ErrorKind;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join("voice-notes-recording-tests")
    }

    async fn started(backend: &FakeBackend, name: &str) -> RecordingSession {
        let mut session = RecordingSession::new(backend.capabilities());
        session.start(Arc::new(backend.clone()), &scratch_dir(), name).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_start_builds_absolute_path_from_name() {
        let backend = FakeBackend::new();
        let mut session = RecordingSession::new(backend.capabilities());
        let path = session.start(Arc::new(backend.clone()), &scratch_dir(), "x").await.unwrap();

        assert!(path.is_absolute());
        assert_eq!(path.file_name().unwrap(), "x.m4a");
        assert_eq!(session.state(), RecorderState::Recording);
        assert_eq!(backend.state.lock().last_output.as_deref(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn test_commands_on_idle_session_are_rejected() {
        let mut session = RecordingSession::new(DeviceCapabilities::default());

        assert_eq!(session.pause().await.unwrap_err().kind(), ErrorKind::RecorderNotInitialized);
        assert_eq!(session.resume().await.unwrap_err().kind(), ErrorKind::RecorderNotInitialized);
        assert_eq!(session.stop().await.unwrap_err().kind(), ErrorKind::RecorderNotInitialized);
        assert_eq!(session.amplitude().await.unwrap_err().kind(), ErrorKind::RecorderNotInitialized);
        assert_eq!(session.output_file().unwrap_err().kind(), ErrorKind::NoFile);
        assert_eq!(session.state(), RecorderState::Idle);
        assert!(session.output_path().is_none());
    }

    #[tokio::test]
    async fn test_wrong_live_state_is_rejected_without_change() {
        let backend = FakeBackend::new();
        let mut session = started(&backend, "live").await;

        assert_eq!(session.resume().await.unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(session.state(), RecorderState::Recording);

        session.pause().await.unwrap();
        assert_eq!(session.pause().await.unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(session.amplitude().await.unwrap_err().kind(), ErrorKind::RecorderNotInitialized);
        assert_eq!(session.state(), RecorderState::Paused);
    }

    #[tokio::test]
    async fn test_stop_twice_releases_once() {
        let backend = FakeBackend::new();
        let mut session = started(&backend, "twice").await;

        let path = session.stop().await.unwrap();
        let second = session.stop().await.unwrap_err();
        let third = session.stop().await.unwrap_err();

        assert_eq!(session.state(), RecorderState::Stopped);
        assert_eq!(second.kind(), ErrorKind::InvalidState);
        assert_eq!(second.to_string(), third.to_string());
        assert_eq!(session.output_file().unwrap(), path);

        let state = backend.state.lock();
        assert_eq!(state.capture_stops, 1);
        assert_eq!(state.capture_releases, 1);
    }

    #[tokio::test]
    async fn test_pause_unsupported_leaves_state_alone() {
        let backend = FakeBackend::without_pause();
        let mut session = started(&backend, "nopause").await;

        let err = session.pause().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ErrorPause);
        assert!(err.to_string().contains("not supported"));
        assert_eq!(session.state(), RecorderState::Recording);

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_device_pause_failure_is_recoverable() {
        let backend = FakeBackend::new();
        let mut session = started(&backend, "pausefail").await;
        backend.state.lock().fail_pause = true;

        let err = session.pause().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ErrorPause);
        assert!(err.device_error().is_some());
        assert_eq!(session.state(), RecorderState::Recording);
    }

    #[tokio::test]
    async fn test_device_resume_failure_stays_paused() {
        let backend = FakeBackend::new();
        let mut session = started(&backend, "resumefail").await;
        session.pause().await.unwrap();
        backend.state.lock().fail_resume = true;

        let err = session.resume().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ErrorResume);
        assert!(err.device_error().is_some());
        assert_eq!(session.state(), RecorderState::Paused);

        backend.state.lock().fail_resume = false;
        session.resume().await.unwrap();
        assert_eq!(session.state(), RecorderState::Recording);
    }

    #[tokio::test]
    async fn test_amplitude_failure_keeps_recording() {
        let backend = FakeBackend::new();
        let mut session = started(&backend, "metering").await;
        backend.state.lock().fail_amplitude = true;

        assert_eq!(session.amplitude().await.unwrap_err().kind(), ErrorKind::ErrorGettingAmplitude);
        assert_eq!(session.state(), RecorderState::Recording);
        assert!(session.amplitude_history().is_empty());

        session.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_worker_fails_session() {
        let backend = FakeBackend::new();
        let mut session = started(&backend, "crash").await;
        backend.state.lock().crash_device = true;

        let err = session.amplitude().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ErrorGettingAmplitude);
        assert!(matches!(err.device_error(), Some(DeviceError::WorkerGone)));
        assert_eq!(session.state(), RecorderState::Failed);

        assert_eq!(session.pause().await.unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(session.stop().await.unwrap_err().kind(), ErrorKind::InvalidState);
        assert!(session.output_file().is_ok());
    }

    #[tokio::test]
    async fn test_finalize_failure_still_releases_device() {
        let backend = FakeBackend::new();
        let mut session = started(&backend, "diskfull").await;
        backend.state.lock().fail_stop = true;

        let err = session.stop().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ErrorStoppingRecording);
        assert_eq!(session.state(), RecorderState::Failed);
        assert_eq!(backend.state.lock().capture_releases, 1);

        assert_eq!(session.stop().await.unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(backend.state.lock().capture_releases, 1);
    }

    #[tokio::test]
    async fn test_open_failure_moves_to_failed() {
        let backend = FakeBackend::new();
        backend.state.lock().fail_open_capture = true;
        let mut session = RecordingSession::new(backend.capabilities());

        let err = session.start(Arc::new(backend.clone()), &scratch_dir(), "nomic").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ErrorStartingRecording);
        assert!(matches!(err.device_error(), Some(DeviceError::NoDevice(_))));
        assert_eq!(session.state(), RecorderState::Failed);
        assert!(session.output_path().is_some());
        assert_eq!(session.output_file().unwrap_err().kind(), ErrorKind::NoFile);
    }

    #[tokio::test]
    async fn test_bad_names_never_touch_the_device() {
        let backend = FakeBackend::new();
        for name in ["", "  ", "../escape", "a/b", "a\\b"] {
            let mut session = RecordingSession::new(backend.capabilities());
            let err = session.start(Arc::new(backend.clone()), &scratch_dir(), name).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ErrorStartingRecording);
            assert_eq!(session.state(), RecorderState::Idle);
        }
        assert_eq!(backend.state.lock().capture_opens, 0);
    }

    #[tokio::test]
    async fn test_amplitude_feeds_history() {
        let backend = FakeBackend::new();
        backend.state.lock().amplitudes.extend([120, 4000, 32767]);
        let mut session = started(&backend, "levels").await;

        assert_eq!(session.amplitude().await.unwrap(), 120);
        assert_eq!(session.amplitude().await.unwrap(), 4000);
        assert_eq!(session.amplitude().await.unwrap(), 32767);
        assert_eq!(session.amplitude_history(), vec![120, 4000, 32767]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_skips_paused_spans() {
        let mut clock = CaptureClock::default();
        clock.run();
        tokio::time::advance(Duration::from_secs(3)).await;
        clock.hold();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(clock.elapsed(), Duration::from_secs(3));

        clock.run();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(clock.elapsed(), Duration::from_secs(5));
    }
}
