//! Decoded audio frames and PCM decoding.

use crate::error::{Result, SpeakError};
use std::time::Duration;

/// One decoded unit of playable sound: mono f32 samples at a fixed rate.
///
/// Frames are never mutated after creation; the scheduler owns them until
/// they have been handed to the output device.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Linear samples in [-1, 1], mono.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Create a frame from already-linear samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback duration of this frame.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Whether the frame carries no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decode little-endian signed 16-bit PCM into linear f32 samples.
///
/// The conversion is a linear rescale by 1/32768: i16::MIN maps to -1.0,
/// i16::MAX to just under 1.0. No clipping is applied beyond the integer's
/// natural range.
///
/// # Errors
///
/// Returns [`SpeakError::Decode`] if the byte length is odd.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(SpeakError::Decode(format!(
            "PCM payload has odd length {}",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            f32::from(value) / 32_768.0
        })
        .collect();
    Ok(samples)
}
