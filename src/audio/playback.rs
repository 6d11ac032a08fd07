//! File playback through the default output device using cpal.
//!
//! The whole file is decoded and resampled to the device rate up front. The
//! output callback reads from the decoded buffer at an atomic play head, so
//! pause, seek and position queries never touch the audio thread.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use tracing::{debug, info, warn};

use super::resampler::resample;
use super::util::{find_best_config, get_device_name, ms_to_samples, samples_to_ms};
use super::wav;
use crate::device::{DeviceError, PlaybackDevice, PlaybackEvents};

/// Decoded audio plus the shared play head.
struct PlayHead {
    samples: Vec<f32>,     // Mono samples at the device rate
    sample_rate: u32,      // Device sample rate
    position: AtomicUsize, // Next sample to output
    playing: AtomicBool,   // Whether the callback advances the head
}

impl PlayHead {
    fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate, position: AtomicUsize::new(0), playing: AtomicBool::new(false) }
    }

    /// Fill an interleaved output buffer, duplicating mono samples to every channel.
    ///
    /// # Returns
    /// `true` exactly once, when this call consumed the last sample.
    fn fill(&self, data: &mut [f32], channels: usize) -> bool {
        if !self.playing.load(Ordering::Acquire) {
            data.fill(0.0);
            return false;
        }

        let start = self.position.load(Ordering::Acquire).min(self.samples.len());
        let mut cursor = start;
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = match self.samples.get(cursor) {
                Some(&s) => {
                    cursor += 1;
                    s
                }
                None => 0.0,
            };
            frame.fill(sample);
        }

        // A concurrent seek wins over this buffer's advance
        if self.position.compare_exchange(start, cursor, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return false;
        }

        cursor >= self.samples.len() && self.playing.swap(false, Ordering::AcqRel)
    }

    fn seek(&self, position_ms: u32) {
        let target = ms_to_samples(position_ms, self.sample_rate).min(self.samples.len());
        self.position.store(target, Ordering::Release);
    }

    fn position_ms(&self) -> u32 {
        samples_to_ms(self.position.load(Ordering::Acquire), self.sample_rate)
    }

    fn duration_ms(&self) -> u32 {
        samples_to_ms(self.samples.len(), self.sample_rate)
    }
}

/// Audio player bound to a single decoded file.
pub struct Player {
    stream: Stream,     // cpal audio stream (kept alive)
    head: Arc<PlayHead>, // Shared with the output callback
}

impl Player {
    /// Decode `source` and prepare the default output device for it.
    ///
    /// The stream is opened paused at position 0.
    ///
    /// # Arguments
    /// * `source` - WAV file to play
    /// * `events` - Receives end-of-stream and stream faults
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be decoded
    /// - No output device is available
    /// - Failed to build output stream
    pub fn open(source: &Path, events: PlaybackEvents) -> Result<Self, DeviceError> {
        let (samples, file_sample_rate) = wav::load(source)?;

        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(DeviceError::NoDevice("output"))?;

        info!("Using output device: {}", get_device_name(&device));

        // Query device's preferred sample rate for better compatibility
        let device_sample_rate = match device.default_output_config() {
            Ok(default_config) => default_config.sample_rate(),
            Err(_) => {
                let supported_configs = device.supported_output_configs().map_err(|e| DeviceError::Configure(e.to_string()))?;
                find_best_config(supported_configs, 48000)?.sample_rate()
            }
        };

        let supported_configs = device.supported_output_configs().map_err(|e| DeviceError::Configure(e.to_string()))?;
        let config = find_best_config(supported_configs, device_sample_rate)?;
        let device_sample_rate = config.sample_rate();

        let samples = if device_sample_rate != file_sample_rate {
            debug!("Resampling {} from {} Hz to {} Hz", source.display(), file_sample_rate, device_sample_rate);
            resample(&samples, file_sample_rate, device_sample_rate).map_err(|e| DeviceError::Decode(e.to_string()))?
        } else {
            samples
        };

        debug!("Audio playback config: {} Hz, {} channels, {:?}", device_sample_rate, config.channels(), config.sample_format());

        let head = Arc::new(PlayHead::new(samples, device_sample_rate));
        let head_clone = head.clone();
        let end_events = events.clone();
        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let err_fn = move |err| {
            tracing::error!("Audio playback error: {}", err);
            events.fault(DeviceError::Stream(format!("{}", err)));
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if head_clone.fill(data, channels) {
                        end_events.end_of_stream();
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::Configure(e.to_string()))?;

        // Some hosts start streams on build
        let _ = stream.pause();

        info!("Loaded {} ({} ms at {} Hz)", source.display(), head.duration_ms(), device_sample_rate);

        Ok(Self { stream, head })
    }
}

impl PlaybackDevice for Player {
    fn play(&mut self) -> Result<(), DeviceError> {
        self.head.playing.store(true, Ordering::Release);
        if let Err(e) = self.stream.play() {
            self.head.playing.store(false, Ordering::Release);
            return Err(DeviceError::Stream(e.to_string()));
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.head.playing.store(false, Ordering::Release);
        self.stream.pause().map_err(|e| DeviceError::Stream(e.to_string()))
    }

    fn is_playing(&self) -> bool {
        self.head.playing.load(Ordering::Acquire)
    }

    fn seek_to(&mut self, position_ms: u32) -> Result<(), DeviceError> {
        self.head.seek(position_ms);
        Ok(())
    }

    fn position_ms(&self) -> Result<u32, DeviceError> {
        Ok(self.head.position_ms())
    }

    fn duration_ms(&self) -> Result<u32, DeviceError> {
        Ok(self.head.duration_ms())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.head.playing.store(false, Ordering::SeqCst);
        if let Err(e) = self.stream.pause() {
            warn!("Failed to pause output stream on release: {}", e);
        }
    }
}
