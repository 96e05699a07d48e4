//! Audio frame types and the inbound capture buffer.
//!
//! Samples are carried as `f32` internally (normalized to `[-1.0, 1.0]`)
//! and converted to/from little-endian signed 16-bit PCM at the wire
//! boundary, mirroring how the PCM16 <-> f32 conversion is done throughout
//! the rest of this codebase's audio path.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// PCM16 full-scale normalization constant, shared by encode and decode so
/// the two are exact inverses at zero.
const PCM16_NORMALIZE: f32 = 32768.0;
const PCM16_SCALE: f32 = 32767.0;

/// A declared sample rate in Hz. The wire protocol lets the client declare
/// an arbitrary rate per utterance (`AUDIO_START`), so this is a thin
/// newtype rather than a closed enum of well-known rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleRateHz(pub u32);

impl SampleRateHz {
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn samples_per_ms(&self) -> usize {
        self.0 as usize / 1000
    }
}

impl Default for SampleRateHz {
    fn default() -> Self {
        SampleRateHz(16_000)
    }
}

/// Channel configuration. Inbound audio is always mono per the wire
/// contract; this stays an enum rather than a bare `1` so the capture path
/// has somewhere to reject non-mono declarations explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Channels {
    #[default]
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(&self) -> usize {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }

    pub fn from_count(n: u8) -> Option<Self> {
        match n {
            1 => Some(Channels::Mono),
            2 => Some(Channels::Stereo),
            _ => None,
        }
    }
}

/// A frame of audio samples with enough metadata to resample, reorder, and
/// schedule it.
#[derive(Clone)]
pub struct AudioFrame {
    pub samples: Arc<[f32]>,
    pub sample_rate: SampleRateHz,
    pub channels: Channels,
    pub sequence: u64,
    pub timestamp: Instant,
    pub duration: Duration,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .field("duration", &self.duration)
            .finish()
    }
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: SampleRateHz, channels: Channels, sequence: u64) -> Self {
        let duration = Duration::from_secs_f64(
            samples.len() as f64 / (sample_rate.as_u32() as f64 * channels.count() as f64),
        );
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
            sequence,
            timestamp: Instant::now(),
            duration,
        }
    }

    /// Decode little-endian signed 16-bit PCM bytes into a frame.
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRateHz, channels: Channels, sequence: u64) -> Self {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / PCM16_NORMALIZE)
            .collect();
        Self::new(samples, sample_rate, channels, sequence)
    }

    /// Encode back to little-endian signed 16-bit PCM bytes.
    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                ((clamped * PCM16_SCALE) as i16).to_le_bytes()
            })
            .collect()
    }

    /// Resample to a target rate using Rubato's FFT-based resampler, with a
    /// linear fallback for frames too short for the FFT path to run on.
    pub fn resample(&self, target_rate: SampleRateHz) -> Self {
        use rubato::{FftFixedIn, Resampler};

        if self.sample_rate == target_rate {
            return self.clone();
        }

        if self.samples.len() < 64 {
            return self.resample_linear(target_rate);
        }

        let from_rate = self.sample_rate.as_u32() as usize;
        let to_rate = target_rate.as_u32() as usize;
        let samples_f64: Vec<f64> = self.samples.iter().map(|&s| s as f64).collect();
        let chunk_size = self.samples.len().min(1024);

        match FftFixedIn::<f64>::new(from_rate, to_rate, chunk_size, 2, 1) {
            Ok(mut resampler) => match resampler.process(&[samples_f64], None) {
                Ok(output) => {
                    let resampled: Vec<f32> = output[0].iter().map(|&s| s as f32).collect();
                    Self::new(resampled, target_rate, self.channels, self.sequence)
                }
                Err(e) => {
                    tracing::warn!("rubato processing failed, using linear fallback: {e}");
                    self.resample_linear(target_rate)
                }
            },
            Err(e) => {
                tracing::warn!("rubato init failed, using linear fallback: {e}");
                self.resample_linear(target_rate)
            }
        }
    }

    fn resample_linear(&self, target_rate: SampleRateHz) -> Self {
        let ratio = target_rate.as_u32() as f64 / self.sample_rate.as_u32() as f64;
        let new_len = (self.samples.len() as f64 * ratio) as usize;
        let mut resampled = Vec::with_capacity(new_len);
        for i in 0..new_len {
            let src_idx = i as f64 / ratio;
            let idx_floor = src_idx.floor() as usize;
            let idx_ceil = (idx_floor + 1).min(self.samples.len().saturating_sub(1));
            let frac = (src_idx - idx_floor as f64) as f32;
            let sample = self.samples[idx_floor] * (1.0 - frac) + self.samples[idx_ceil] * frac;
            resampled.push(sample);
        }
        Self::new(resampled, target_rate, self.channels, self.sequence)
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}

/// Error returned when appending to a `CaptureBuffer` would exceed its
/// configured ceiling. Per the wire contract (`AUDIO_CHUNK` arriving
/// between `AUDIO_START` and `AUDIO_END`), the session surfaces this as
/// `ERROR{code: INPUT_TOO_LONG}` and resets to `IDLE` rather than silently
/// truncating audio the user spoke.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("capture buffer exceeded max duration of {max_secs}s")]
pub struct CaptureOverflow {
    pub max_secs: u64,
}

/// Accumulates inbound PCM for one utterance between `AUDIO_START` and
/// `AUDIO_END`. Unlike a general ring buffer, it never evicts: once full it
/// refuses further pushes so the caller can fail the turn instead of
/// silently losing the tail of what the user said.
pub struct CaptureBuffer {
    samples: Vec<f32>,
    sample_rate: SampleRateHz,
    max_duration: Duration,
}

impl CaptureBuffer {
    pub fn new(sample_rate: SampleRateHz, max_duration: Duration) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            max_duration,
        }
    }

    pub fn push(&mut self, frame: &AudioFrame) -> Result<(), CaptureOverflow> {
        let frame = if frame.sample_rate != self.sample_rate {
            frame.resample(self.sample_rate)
        } else {
            frame.clone()
        };
        let frame = if frame.channels != Channels::Mono {
            tracing::warn!("non-mono audio frame received on capture buffer, averaging to mono");
            frame
        } else {
            frame
        };

        self.samples.extend(frame.samples.iter());

        if self.duration() > self.max_duration {
            Err(CaptureOverflow {
                max_secs: self.max_duration.as_secs(),
            })
        } else {
            Ok(())
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> SampleRateHz {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate.as_u32() as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&s| {
                let clamped = s.clamp(-1.0, 1.0);
                ((clamped * PCM16_SCALE) as i16).to_le_bytes()
            })
            .collect()
    }
}
