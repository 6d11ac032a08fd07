//! WAV container used for recordings.
//!
//! Recordings are written as 16-bit PCM mono at the capture device's rate.
//! Any PCM or float WAV can be read back for playback; multi-channel files
//! are mixed down to mono.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use super::util::convert_to_mono;
use crate::device::DeviceError;

/// Extension appended to recording names.
pub const CONTAINER_EXTENSION: &str = "wav";

pub type Writer = WavWriter<BufWriter<File>>;

/// Create a mono 16-bit writer at `path`.
pub fn create(path: &Path, sample_rate: u32) -> Result<Writer, DeviceError> {
    let spec = WavSpec { channels: 1, sample_rate, bits_per_sample: 16, sample_format: SampleFormat::Int };
    WavWriter::create(path, spec).map_err(|e| DeviceError::Encode(format!("{}: {}", path.display(), e)))
}

/// Append f32 samples, clamping to full scale.
pub fn write_samples(writer: &mut Writer, samples: &[f32]) -> Result<(), DeviceError> {
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).map_err(|e| DeviceError::Encode(e.to_string()))?;
    }
    Ok(())
}

/// Flush and close the container, patching the header lengths.
pub fn finalize(writer: Writer) -> Result<(), DeviceError> {
    writer.finalize().map_err(|e| DeviceError::Encode(format!("Failed to finalize WAV file: {}", e)))
}

/// Remove a container left behind by a capture that never started.
///
/// A file that was never created is not an error.
pub fn discard(path: &Path) -> Result<(), DeviceError> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(DeviceError::Io(e)),
        _ => Ok(()),
    }
}

/// Load a WAV file as mono f32 samples.
///
/// # Returns
/// The samples and their sample rate.
pub fn load(path: &Path) -> Result<(Vec<f32>, u32), DeviceError> {
    let reader = WavReader::open(path).map_err(|e| DeviceError::Decode(format!("{}: {}", path.display(), e)))?;

    let spec = reader.spec();
    let samples: Result<Vec<f32>, _> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect(),
        SampleFormat::Int => {
            let max_value = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader.into_samples::<i32>().map(|s| s.map(|v| v as f32 / max_value)).collect()
        }
    };
    let samples = samples.map_err(|e| DeviceError::Decode(format!("Failed to read samples: {}", e)))?;

    Ok((convert_to_mono(&samples, spec.channels as usize), spec.sample_rate))
}
