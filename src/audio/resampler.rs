//! Batch resampling of decoded files to the output device rate.

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

/// Chunk size for FFT-based resampling (provides good quality and performance).
const CHUNK_SIZE: usize = 1024;

/// Number of sub-chunks for FFT processing (higher = better quality but more CPU).
const SUB_CHUNKS: usize = 2;

/// Resample a whole mono buffer from one sample rate to another.
///
/// The output holds exactly `len * to_rate / from_rate` samples so that the
/// reported duration of a file does not depend on the device rate.
///
/// # Arguments
/// * `samples` - Input audio samples
/// * `from_rate` - Sample rate of the decoded file
/// * `to_rate` - Sample rate of the output device
///
/// # Errors
/// Returns an error if either rate is zero or rubato rejects a chunk.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }
    anyhow::ensure!(from_rate > 0 && to_rate > 0, "Invalid resampling rates {} -> {}", from_rate, to_rate);

    let mut resampler = Fft::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1, FixedSync::Input).context("Failed to create resampler")?;

    let output_frames_max = resampler.output_frames_max();
    let mut output_buffer = vec![0.0f32; output_frames_max];

    let expected_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let mut output = Vec::with_capacity(expected_len + output_frames_max);
    let mut chunk = vec![0.0f32; CHUNK_SIZE];

    for input in samples.chunks(CHUNK_SIZE) {
        // Last chunk is zero-padded
        chunk[..input.len()].copy_from_slice(input);
        chunk[input.len()..].fill(0.0);

        let input_adapter = InterleavedSlice::new(&chunk, 1, CHUNK_SIZE).context("Failed to create input adapter")?;
        let mut output_adapter = InterleavedSlice::new_mut(&mut output_buffer, 1, output_frames_max).context("Failed to create output adapter")?;

        let (_, frames_written) = resampler.process_into_buffer(&input_adapter, &mut output_adapter, None).map_err(|e| anyhow::anyhow!("Resampling error: {}", e))?;
        output.extend_from_slice(&output_buffer[..frames_written]);
    }

    output.resize(expected_len, 0.0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_keeps_duration() {
        let samples = vec![0.0; 8000]; // 1 second at 8kHz
        let result = resample(&samples, 8000, 44100).unwrap();
        assert_eq!(result.len(), 44100);

        let samples = vec![0.0; 48000];
        let result = resample(&samples, 48000, 16000).unwrap();
        assert_eq!(result.len(), 16000);
    }

    #[test]
    fn test_same_rate_is_a_copy() {
        let samples = vec![0.25, -0.5, 1.0];
        assert_eq!(resample(&samples, 44100, 44100).unwrap(), samples);
    }

    #[test]
    fn test_zero_rate_is_rejected() {
        assert!(resample(&[0.0; 10], 0, 44100).is_err());
    }
}
