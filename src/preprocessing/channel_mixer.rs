//! Decoded-audio abstraction and channel mixing (multi-channel to mono)

use crate::error::AnalysisError;

/// Decoded PCM audio as exposed by the host
///
/// The pipeline never decodes files itself; any buffer type that can hand out per-channel
/// `f32` slices can be analyzed.
pub trait AudioSource {
    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Number of channels
    fn number_of_channels(&self) -> usize;

    /// Samples of channel `channel`, normalized to [-1.0, 1.0]
    fn channel_data(&self, channel: usize) -> &[f32];

    /// Duration in seconds (length of channel 0)
    fn duration_seconds(&self) -> f32 {
        if self.number_of_channels() == 0 || self.sample_rate() == 0 {
            return 0.0;
        }
        self.channel_data(0).len() as f32 / self.sample_rate() as f32
    }
}

/// Owned planar PCM buffer
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl PcmBuffer {
    /// Build from planar channels
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Single-channel buffer
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    /// Split interleaved samples into planar channels (trailing partial frame dropped)
    pub fn from_interleaved(sample_rate: u32, num_channels: usize, samples: &[f32]) -> Self {
        let num_channels = num_channels.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / num_channels); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self::new(sample_rate, channels)
    }
}

impl AudioSource for PcmBuffer {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    fn channel_data(&self, channel: usize) -> &[f32] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Mean-mix all channels to mono
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for a zero sample rate, zero channels or channels
/// of different lengths.
pub fn mix_to_mono(audio: &dyn AudioSource) -> Result<Vec<f32>, AnalysisError> {
    if audio.sample_rate() == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate".to_string()));
    }

    let num_channels = audio.number_of_channels();
    if num_channels == 0 {
        return Err(AnalysisError::InvalidInput(
            "Audio has no channels".to_string(),
        ));
    }

    let len = audio.channel_data(0).len();
    for ch in 1..num_channels {
        let other = audio.channel_data(ch).len();
        if other != len {
            return Err(AnalysisError::InvalidInput(format!(
                "Channel length mismatch: channel 0 has {} samples, channel {} has {}",
                len, ch, other
            )));
        }
    }

    log::debug!(
        "Mixing {} channel(s) of {} samples to mono",
        num_channels,
        len
    );

    if num_channels == 1 {
        return Ok(audio.channel_data(0).to_vec());
    }

    let mut mono = vec![0.0f32; len];
    for ch in 0..num_channels {
        for (acc, &s) in mono.iter_mut().zip(audio.channel_data(ch)) {
            *acc += s;
        }
    }
    let scale = 1.0 / num_channels as f32;
    for s in &mut mono {
        *s *= scale;
    }
    Ok(mono)
}
