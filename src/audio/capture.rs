//! Microphone capture into a WAV container using cpal.
//!
//! The input callback mixes each buffer down to mono, tracks the peak level and
//! pushes samples into a lock-free ring buffer. A writer thread drains the ring
//! buffer into the container until the capture is stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapRb};
use tracing::{debug, info, warn};

use super::util::{convert_to_mono, find_best_config, get_device_name, peak_level};
use super::wav;
use crate::device::{CaptureDevice, DeviceError};

/// Ring buffer size in samples (~3 seconds at 44.1kHz).
const RING_SIZE: usize = 131072;

/// Samples moved from the ring buffer per write.
const WRITE_CHUNK: usize = 4096;

/// Audio capturer that records the default input device into a file.
pub struct Capturer {
    stream: Stream,                                                // cpal audio stream (kept alive)
    output: PathBuf,                                               // Container, created on start
    sample_rate: u32,                                              // Negotiated device rate
    running: Arc<AtomicBool>,                                      // Pause/resume flag
    shutdown: Arc<AtomicBool>,                                     // Permanent stop flag for the writer
    peak: Arc<AtomicU32>,                                          // Peak level since the last query
    consumer: Option<HeapCons<f32>>,                               // Ring buffer consumer, moved into the writer
    writer_handle: Option<JoinHandle<Result<(), DeviceError>>>,    // Thread draining ring buffer into the file
}

impl Capturer {
    /// Open the default input device and prepare a capture into `output`.
    ///
    /// The stream is built paused; the container is not created until
    /// [`CaptureDevice::start`].
    ///
    /// # Arguments
    /// * `output` - Absolute path of the container to create
    /// * `sample_rate` - Preferred capture rate; the closest supported rate is used otherwise
    ///
    /// # Errors
    /// Returns an error if:
    /// - No input device is available
    /// - No usable input configuration exists
    /// - Failed to build input stream
    pub fn open(output: &Path, sample_rate: u32) -> Result<Self, DeviceError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(DeviceError::NoDevice("input"))?;

        info!("Using input device: {}", get_device_name(&device));

        let supported_configs = device.supported_input_configs().map_err(|e| DeviceError::Configure(e.to_string()))?;
        let config = find_best_config(supported_configs, sample_rate)?;
        let device_sample_rate = config.sample_rate();
        if device_sample_rate != sample_rate {
            info!("Input device does not support {} Hz, recording at {} Hz", sample_rate, device_sample_rate);
        }

        debug!("Audio capture config: {} Hz, {} channels, {:?}", device_sample_rate, config.channels(), config.sample_format());

        let channels = config.channels() as usize;
        let stream_config: StreamConfig = config.config();

        let running = Arc::new(AtomicBool::new(false));
        let peak = Arc::new(AtomicU32::new(0));
        let running_clone = running.clone();
        let peak_clone = peak.clone();

        let ring = HeapRb::<f32>::new(RING_SIZE);
        let (mut producer, consumer) = ring.split();

        let err_fn = |err| {
            tracing::error!("Audio capture error: {}", err);
        };

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !running_clone.load(Ordering::Relaxed) {
                        return;
                    }
                    let samples = convert_to_mono(data, channels);
                    peak_clone.fetch_max(peak_level(&samples), Ordering::Relaxed);

                    let written = producer.push_slice(&samples);
                    if written < samples.len() {
                        static DROP_COUNT: AtomicU64 = AtomicU64::new(0);
                        let count = DROP_COUNT.fetch_add(1, Ordering::Relaxed);
                        if count.is_multiple_of(100) {
                            tracing::warn!("Ring buffer full, dropped {} audio chunks", count + 1);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| DeviceError::Configure(e.to_string()))?;

        // Some hosts start streams on build
        let _ = stream.pause();

        Ok(Self {
            stream,
            output: output.to_path_buf(),
            sample_rate: device_sample_rate,
            running,
            shutdown: Arc::new(AtomicBool::new(false)),
            peak,
            consumer: Some(consumer),
            writer_handle: None,
        })
    }

    fn spawn_writer(&mut self) -> Result<(), DeviceError> {
        let Some(mut consumer) = self.consumer.take() else {
            return Err(DeviceError::Stream("capture already started".to_string()));
        };
        let mut writer = wav::create(&self.output, self.sample_rate)?;
        let shutdown = self.shutdown.clone();

        let handle = std::thread::Builder::new()
            .name("voice-notes-writer".to_string())
            .spawn(move || {
                let mut buffer = vec![0.0f32; WRITE_CHUNK];
                loop {
                    let read = consumer.pop_slice(&mut buffer);
                    if read > 0 {
                        wav::write_samples(&mut writer, &buffer[..read])?;
                        continue;
                    }
                    // Drain everything captured before the stop request
                    if shutdown.load(Ordering::Acquire) && consumer.is_empty() {
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                wav::finalize(writer)
            })?;

        self.writer_handle = Some(handle);
        Ok(())
    }

    /// Stop the stream and the writer thread, returning the finalize result.
    fn shutdown(&mut self) -> Result<(), DeviceError> {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.stream.pause();
        self.shutdown.store(true, Ordering::Release);

        match self.writer_handle.take() {
            Some(handle) => handle.join().map_err(|_| DeviceError::Encode("writer thread panicked".to_string()))?,
            None => Ok(()),
        }
    }

    fn begin(&mut self) -> Result<(), DeviceError> {
        if self.writer_handle.is_none() {
            self.spawn_writer()?;
        }
        self.running.store(true, Ordering::SeqCst);
        self.stream.play().map_err(|e| DeviceError::Stream(e.to_string()))
    }
}

impl CaptureDevice for Capturer {
    fn start(&mut self) -> Result<(), DeviceError> {
        if let Err(e) = self.begin() {
            // A failed start leaves no file behind
            if let Err(shutdown_err) = self.shutdown() {
                debug!("Writer shutdown after failed start: {}", shutdown_err);
            }
            if let Err(discard_err) = wav::discard(&self.output) {
                warn!("Failed to remove {}: {}", self.output.display(), discard_err);
            }
            return Err(e);
        }
        info!("Audio capture started: {}", self.output.display());
        Ok(())
    }

    fn pause(&mut self) -> Result<(), DeviceError> {
        self.running.store(false, Ordering::SeqCst);
        self.stream.pause().map_err(|e| DeviceError::Stream(e.to_string()))?;
        debug!("Audio capture paused");
        Ok(())
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.stream.play().map_err(|e| DeviceError::Stream(e.to_string()))?;
        self.running.store(true, Ordering::SeqCst);
        debug!("Audio capture resumed");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.shutdown()?;
        info!("Audio capture stopped: {}", self.output.display());
        Ok(())
    }

    fn max_amplitude(&mut self) -> Result<i32, DeviceError> {
        Ok(self.peak.swap(0, Ordering::Relaxed) as i32)
    }
}

impl Drop for Capturer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Failed to finalize {}: {}", self.output.display(), e);
        }
    }
}
