//! In-memory backend used by the session tests.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AudioBackend, CaptureDevice, DeviceCapabilities, DeviceError, PlaybackDevice, PlaybackEvents};

#[derive(Default)]
pub(crate) struct FakeState {
    pub capture_opens: usize,
    pub capture_releases: usize,
    pub capture_stops: usize,
    pub playback_opens: usize,
    pub playback_releases: usize,
    pub last_output: Option<PathBuf>,

    pub fail_open_capture: bool,
    pub fail_stop: bool,
    pub fail_pause: bool,
    pub fail_open_playback: bool,
    pub fail_playback_pause: bool,
    pub fail_resume: bool,
    pub fail_seek: bool,
    pub fail_position: bool,
    pub fail_duration: bool,
    pub fail_amplitude: bool,
    pub crash_device: bool,
    pub amplitudes: VecDeque<i32>,

    pub files: HashSet<PathBuf>,
    pub duration_ms: u32,
    pub position_ms: u32,
    pub playing: bool,
    pub events: Option<PlaybackEvents>,
}

#[derive(Clone)]
pub(crate) struct FakeBackend {
    pub state: Arc<Mutex<FakeState>>,
    capabilities: DeviceCapabilities,
}

impl FakeBackend {
    pub fn new() -> Self {
        let state = FakeState { duration_ms: 10_000, ..Default::default() };
        Self { state: Arc::new(Mutex::new(state)), capabilities: DeviceCapabilities::default() }
    }

    pub fn without_pause() -> Self {
        Self { capabilities: DeviceCapabilities { pause_supported: false }, ..Self::new() }
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        self.state.lock().files.insert(path.into());
    }

    /// Move the play head forward as if the device had been producing sound.
    pub fn advance(&self, ms: u32) {
        let mut state = self.state.lock();
        if state.playing {
            state.position_ms = (state.position_ms + ms).min(state.duration_ms);
        }
    }

    /// Simulate the device reaching the end of the file.
    pub fn finish_playback(&self) {
        let mut state = self.state.lock();
        state.position_ms = state.duration_ms;
        state.playing = false;
        if let Some(events) = &state.events {
            events.end_of_stream();
        }
    }

    pub fn fault_playback(&self, message: &str) {
        let mut state = self.state.lock();
        state.playing = false;
        if let Some(events) = &state.events {
            events.fault(DeviceError::Stream(message.to_string()));
        }
    }
}

// Panics on the worker thread, taking the device down with it.
fn crash_if_asked(state: &Mutex<FakeState>) {
    let crash = state.lock().crash_device;
    if crash {
        panic!("fake device crashed");
    }
}

fn injected(fail: bool, what: &str) -> Result<(), DeviceError> {
    if fail {
        return Err(DeviceError::Stream(format!("{} rejected", what)));
    }
    Ok(())
}

impl AudioBackend for FakeBackend {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn container_extension(&self) -> &'static str {
        "m4a"
    }

    fn open_capture(&self, output: &Path) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        let mut state = self.state.lock();
        if state.fail_open_capture {
            return Err(DeviceError::NoDevice("input"));
        }
        state.capture_opens += 1;
        state.last_output = Some(output.to_path_buf());
        Ok(Box::new(FakeCapture { state: self.state.clone() }))
    }

    fn open_playback(&self, _source: &Path, events: PlaybackEvents) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        let mut state = self.state.lock();
        if state.fail_open_playback {
            return Err(DeviceError::Decode("corrupt header".to_string()));
        }
        state.playback_opens += 1;
        state.position_ms = 0;
        state.playing = false;
        state.events = Some(events);
        Ok(Box::new(FakePlayback { state: self.state.clone() }))
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.state.lock().files.contains(path)
    }
}

struct FakeCapture {
    state: Arc<Mutex<FakeState>>,
}

impl CaptureDevice for FakeCapture {
    fn start(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        injected(self.state.lock().fail_pause, "pause")
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        injected(self.state.lock().fail_resume, "resume")
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.capture_stops += 1;
        if state.fail_stop {
            return Err(DeviceError::Encode("disk full".to_string()));
        }
        Ok(())
    }

    fn max_amplitude(&mut self) -> Result<i32, DeviceError> {
        crash_if_asked(&self.state);
        let mut state = self.state.lock();
        injected(state.fail_amplitude, "amplitude")?;
        Ok(state.amplitudes.pop_front().unwrap_or(0))
    }
}

impl Drop for FakeCapture {
    fn drop(&mut self) {
        self.state.lock().capture_releases += 1;
    }
}

struct FakePlayback {
    state: Arc<Mutex<FakeState>>,
}

impl PlaybackDevice for FakePlayback {
    fn play(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        injected(state.fail_resume, "play")?;
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        injected(state.fail_playback_pause, "pause")?;
        state.playing = false;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn seek_to(&mut self, position_ms: u32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        injected(state.fail_seek, "seek")?;
        state.position_ms = position_ms.min(state.duration_ms);
        Ok(())
    }

    fn position_ms(&self) -> Result<u32, DeviceError> {
        crash_if_asked(&self.state);
        let state = self.state.lock();
        injected(state.fail_position, "position")?;
        Ok(state.position_ms)
    }

    fn duration_ms(&self) -> Result<u32, DeviceError> {
        let state = self.state.lock();
        injected(state.fail_duration, "duration")?;
        Ok(state.duration_ms)
    }
}

impl Drop for FakePlayback {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.playback_releases += 1;
        state.playing = false;
        state.events = None;
    }
}
