//! Host audio backend built on cpal.
//!
//! This module provides:
//! - Microphone capture into 16-bit mono WAV files
//! - File playback through the default output device
//! - Batch resampling via rubato when file and device rates differ

mod capture;
mod playback;
pub mod resampler;
pub mod util;
pub mod wav;

use std::path::Path;

pub use capture::Capturer;
pub use playback::Player;

use crate::device::{AudioBackend, CaptureDevice, DeviceCapabilities, DeviceError, PlaybackDevice, PlaybackEvents};

/// [`AudioBackend`] for the default cpal host.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    sample_rate: u32,
    capabilities: DeviceCapabilities,
}

impl CpalBackend {
    /// # Arguments
    /// * `sample_rate` - Preferred capture rate in Hz
    /// * `pause_supported` - Whether recordings may be paused and resumed
    pub fn new(sample_rate: u32, pause_supported: bool) -> Self {
        Self { sample_rate, capabilities: DeviceCapabilities { pause_supported } }
    }
}

impl AudioBackend for CpalBackend {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn container_extension(&self) -> &'static str {
        wav::CONTAINER_EXTENSION
    }

    fn open_capture(&self, output: &Path) -> Result<Box<dyn CaptureDevice>, DeviceError> {
        Ok(Box::new(Capturer::open(output, self.sample_rate)?))
    }

    fn open_playback(&self, source: &Path, events: PlaybackEvents) -> Result<Box<dyn PlaybackDevice>, DeviceError> {
        Ok(Box::new(Player::open(source, events)?))
    }
}
