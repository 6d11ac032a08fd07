//! Shared audio utilities for capture and playback.

use cpal::traits::DeviceTrait;
use cpal::{Device, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

use crate::device::DeviceError;

/// Full-scale value of the reported input level.
pub const MAX_LEVEL: u32 = i16::MAX as u32;

/// Get a human-readable device name.
///
/// # Arguments
/// * `device` - The audio device
///
/// # Returns
/// Device name string, or "Unknown" if the name cannot be retrieved.
pub fn get_device_name(device: &Device) -> String {
    device.description().ok().map(|desc| desc.name().to_string()).unwrap_or_else(|| "Unknown".to_string())
}

/// Find the best matching audio configuration.
///
/// Searches for a configuration that:
/// 1. Supports mono or stereo (max 2 channels)
/// 2. Uses F32 sample format (universally supported on modern hardware)
/// 3. Matches the target sample rate, or uses the closest available rate
///
/// # Arguments
/// * `configs` - Iterator of supported stream configurations
/// * `target_sample_rate` - Desired sample rate (e.g., 44100 for recordings)
///
/// # Returns
/// The best matching `SupportedStreamConfig`, or an error if no suitable config found.
pub fn find_best_config(configs: impl Iterator<Item = SupportedStreamConfigRange>, target_sample_rate: u32) -> Result<SupportedStreamConfig, DeviceError> {
    let f32_configs: Vec<SupportedStreamConfigRange> = configs.filter(|c| c.channels() <= 2 && c.sample_format() == SampleFormat::F32).collect();

    if f32_configs.is_empty() {
        return Err(DeviceError::Configure("no mono/stereo F32 configuration offered by the device".to_string()));
    }

    for config in &f32_configs {
        if (config.min_sample_rate()..=config.max_sample_rate()).contains(&target_sample_rate) {
            return Ok((*config).with_sample_rate(target_sample_rate));
        }
    }

    // Use first config with closest sample rate
    let config = &f32_configs[0];
    let rate = if target_sample_rate < config.min_sample_rate() {
        config.min_sample_rate()
    } else {
        config.max_sample_rate()
    };
    Ok((*config).with_sample_rate(rate))
}

/// Mix interleaved frames down to mono by averaging channels.
pub fn convert_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        data.to_vec()
    } else {
        data.chunks(channels).map(|frame| frame.iter().sum::<f32>() / frame.len() as f32).collect()
    }
}

/// Peak absolute level of `samples` scaled to `0..=MAX_LEVEL`.
pub fn peak_level(samples: &[f32]) -> u32 {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max).min(1.0);
    (peak * MAX_LEVEL as f32).round() as u32
}

/// Convert a sample count at `sample_rate` to milliseconds.
pub fn samples_to_ms(samples: usize, sample_rate: u32) -> u32 {
    if sample_rate == 0 {
        return 0;
    }
    (samples as u64 * 1000 / sample_rate as u64).min(u32::MAX as u64) as u32
}

/// Convert milliseconds to a sample count at `sample_rate`.
pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (ms as u64 * sample_rate as u64 / 1000) as usize
}
