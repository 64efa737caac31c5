//! Audio format definitions and PCM conversion utilities.
//!
//! Capture runs at 16 kHz mono PCM16; synthesized playback arrives at
//! 24 kHz mono PCM16. Samples cross the wire as base64 but are held as raw
//! little-endian bytes internally.

use serde::{Deserialize, Serialize};

use crate::error::{RealtimeError, Result};

/// Complete audio format specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz (e.g., 24000, 16000).
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono).
    pub channels: u8,
    /// Bits per sample.
    pub bits_per_sample: u8,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::pcm16_24khz()
    }
}

impl AudioFormat {
    /// Create a new audio format specification.
    pub fn new(sample_rate: u32, channels: u8, bits_per_sample: u8) -> Self {
        Self { sample_rate, channels, bits_per_sample }
    }

    /// PCM16 at 16 kHz (microphone capture format).
    pub fn pcm16_16khz() -> Self {
        Self { sample_rate: 16_000, channels: 1, bits_per_sample: 16 }
    }

    /// PCM16 at 24 kHz (synthesized playback format).
    pub fn pcm16_24khz() -> Self {
        Self { sample_rate: 24_000, channels: 1, bits_per_sample: 16 }
    }

    /// Bytes per second for this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.channels as u32 * (self.bits_per_sample / 8) as u32
    }

    /// Duration in seconds of a payload of `bytes` bytes.
    pub fn duration_secs(&self, bytes: usize) -> f64 {
        bytes as f64 / self.bytes_per_second() as f64
    }

    /// Wire mime type for realtime input, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

/// Root-mean-square amplitude of a frame of float samples.
///
/// Used as the volume metric for visualization; an empty frame is silent.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// A block of audio with format information.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Raw PCM16 little-endian bytes.
    pub data: Vec<u8>,
    /// Audio format of this chunk.
    pub format: AudioFormat,
}

impl AudioChunk {
    /// Create a new audio chunk.
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.format.duration_secs(self.data.len())
    }

    /// Encode the payload as base64 for the wire.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Decode a base64 wire payload.
    pub fn from_base64(encoded: &str, format: AudioFormat) -> Result<Self> {
        use base64::Engine;
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| RealtimeError::decode(format!("invalid base64 audio: {e}")))?;
        Ok(Self::new(data, format))
    }

    /// Build a chunk from float samples, converting to PCM16 little-endian.
    ///
    /// Samples are scaled by 32768 and clamped to the i16 range, matching
    /// what capture pipelines feeding this class of endpoint send.
    pub fn from_f32_samples(samples: &[f32], format: AudioFormat) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let value = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            data.extend_from_slice(&value.to_le_bytes());
        }
        Self::new(data, format)
    }

    /// Convert the payload to float samples in [-1.0, 1.0).
    ///
    /// Fails with [`RealtimeError::PlaybackDecode`] when the byte count is
    /// odd (not valid PCM16).
    pub fn to_f32_samples(&self) -> Result<Vec<f32>> {
        if self.data.len() % 2 != 0 {
            return Err(RealtimeError::decode(format!(
                "invalid PCM16 length {} (must be even)",
                self.data.len()
            )));
        }
        let mut samples = Vec::with_capacity(self.data.len() / 2);
        for pair in self.data.chunks_exact(2) {
            let value = i16::from_le_bytes([pair[0], pair[1]]);
            samples.push(value as f32 / 32768.0);
        }
        Ok(samples)
    }
}
