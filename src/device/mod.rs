//! Audio device abstraction consumed by the session engine.
//!
//! A backend opens exclusively-owned capture and playback handles. Every handle
//! lives on its own [`DeviceWorker`] thread, so blocking device calls never run
//! on the caller's runtime. Releasing a handle means dropping it; devices do
//! their own cleanup in `Drop`.

mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::path::Path;

use thiserror::Error;
use tokio::sync::mpsc;

pub use worker::DeviceWorker;

/// Faults reported by the host audio layer.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("No {0} device available")]
    NoDevice(&'static str),

    #[error("Failed to configure audio stream: {0}")]
    Configure(String),

    #[error("Audio stream error: {0}")]
    Stream(String),

    #[error("Failed to encode audio container: {0}")]
    Encode(String),

    #[error("Failed to decode audio file: {0}")]
    Decode(String),

    #[error("Device worker has shut down")]
    WorkerGone,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capabilities negotiated once when the session manager is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Whether capture can be paused and resumed without finalizing the file
    pub pause_supported: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self { pause_supported: true }
    }
}

/// Microphone capture into a container file.
pub trait CaptureDevice {
    /// Begin capturing into the configured output file.
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Suspend capture without finalizing the container.
    fn pause(&mut self) -> Result<(), DeviceError>;

    /// Continue a paused capture.
    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Stop capture and finalize (flush and close) the container.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Maximum absolute level seen since the previous call.
    fn max_amplitude(&mut self) -> Result<i32, DeviceError>;
}

/// File playback through the output device.
pub trait PlaybackDevice {
    /// Start (or restart) producing sound from the current position.
    fn play(&mut self) -> Result<(), DeviceError>;

    /// Stop producing sound, keeping the handle open.
    fn pause(&mut self) -> Result<(), DeviceError>;

    /// Whether the device is currently producing sound.
    fn is_playing(&self) -> bool;

    /// Move the play head. Out-of-range positions are clamped by the device.
    fn seek_to(&mut self, position_ms: u32) -> Result<(), DeviceError>;

    fn position_ms(&self) -> Result<u32, DeviceError>;

    fn duration_ms(&self) -> Result<u32, DeviceError>;
}

/// Host audio subsystem: opens device handles and answers collaborator queries.
///
/// `open_*` are invoked on the worker thread that will own the handle.
pub trait AudioBackend: Send + Sync + 'static {
    /// Capability flags, queried once per session manager.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Fixed container extension appended to recording names (without the dot).
    fn container_extension(&self) -> &'static str;

    /// Open and configure a microphone capture writing to `output`.
    fn open_capture(&self, output: &Path) -> Result<Box<dyn CaptureDevice>, DeviceError>;

    /// Open the output device against `source`. End-of-stream and stream faults
    /// are reported through `events`.
    fn open_playback(&self, source: &Path, events: PlaybackEvents) -> Result<Box<dyn PlaybackDevice>, DeviceError>;

    /// File-existence check used before any playback device is opened.
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Asynchronous notifications raised by a playback device.
#[derive(Debug)]
pub enum PlaybackSignal {
    /// The stream reached its natural end.
    EndOfStream,
    /// The stream failed and the handle is no longer usable.
    Fault(DeviceError),
}

/// Sender half handed to playback devices. Sending never blocks, so it is safe
/// to use from inside an audio callback.
#[derive(Debug, Clone)]
pub struct PlaybackEvents {
    tx: mpsc::UnboundedSender<PlaybackSignal>,
}

impl PlaybackEvents {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlaybackSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn end_of_stream(&self) {
        let _ = self.tx.send(PlaybackSignal::EndOfStream);
    }

    pub fn fault(&self, error: DeviceError) {
        let _ = self.tx.send(PlaybackSignal::Fault(error));
    }
}
