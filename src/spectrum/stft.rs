//! Short-time Fourier transform
//!
//! Frames mono audio, applies a periodic Hann window and keeps the half-spectrum
//! magnitudes of each frame. Frame `t` covers samples `[t·hop, t·hop + fft_size)` and is
//! stamped with its window-center time. Trailing samples that do not fill a whole frame are
//! dropped rather than zero-padded.
//!
//! # Example
//!
//! ```
//! use spectral_mir::cancel::CancellationToken;
//! use spectral_mir::config::SpectrogramConfig;
//! use spectral_mir::spectrum::stft::compute_spectrogram;
//!
//! let samples = vec![0.0f32; 44100];
//! let spec = compute_spectrogram(&samples, 44100, &SpectrogramConfig::default(), &CancellationToken::none())?;
//! assert_eq!(spec.num_frames(), (44100 - 2048) / 512 + 1);
//! assert_eq!(spec.num_bins(), 1025);
//! # Ok::<(), spectral_mir::AnalysisError>(())
//! ```

use serde::{Deserialize, Serialize};

use super::fft::FrameTransform;
use crate::cancel::CancellationToken;
use crate::config::{SpectrogramConfig, WindowKind};
use crate::error::AnalysisError;
use crate::preprocessing::channel_mixer::{mix_to_mono, AudioSource};

/// Magnitude spectrogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrogram {
    /// Sample rate of the analyzed audio in Hz
    pub sample_rate: u32,
    /// FFT size in samples
    pub fft_size: usize,
    /// Hop size in samples
    pub hop_size: usize,
    /// Window-center time of each frame in seconds
    pub times: Vec<f32>,
    /// `magnitudes[frame][bin]`, `fft_size / 2 + 1` bins per frame
    pub magnitudes: Vec<Vec<f32>>,
}

impl Spectrogram {
    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.magnitudes.len()
    }

    /// Bins per frame (`fft_size / 2 + 1`)
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// True when the audio was shorter than one frame
    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    /// Center frequency of `bin` in Hz
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }

    /// Center frequencies of all bins
    pub fn frequencies(&self) -> Vec<f32> {
        (0..self.num_bins()).map(|b| self.bin_frequency(b)).collect()
    }

    /// Fractional bin index of `hz`
    pub fn hz_to_bin(&self, hz: f32) -> f32 {
        hz * self.fft_size as f32 / self.sample_rate as f32
    }

    /// Copy of this spectrogram with new magnitudes (same framing)
    pub fn with_magnitudes(&self, magnitudes: Vec<Vec<f32>>) -> Spectrogram {
        Spectrogram {
            sample_rate: self.sample_rate,
            fft_size: self.fft_size,
            hop_size: self.hop_size,
            times: self.times.clone(),
            magnitudes,
        }
    }
}

/// Number of whole frames that fit in `num_samples`
pub fn frame_count(num_samples: usize, fft_size: usize, hop_size: usize) -> usize {
    if num_samples < fft_size || hop_size == 0 {
        return 0;
    }
    (num_samples - fft_size) / hop_size + 1
}

/// Compute the magnitude spectrogram of mono samples
///
/// # Arguments
///
/// * `samples` - Mono audio samples
/// * `sample_rate` - Sample rate in Hz
/// * `config` - STFT parameters
/// * `cancel` - Polled once per frame
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for invalid configs or a zero sample rate, and
/// `AnalysisError::Cancelled` if the token fires mid-run.
pub fn compute_spectrogram(
    samples: &[f32],
    sample_rate: u32,
    config: &SpectrogramConfig,
    cancel: &CancellationToken,
) -> Result<Spectrogram, AnalysisError> {
    config.validate()?;
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate".to_string()));
    }

    let fft_size = config.fft_size;
    let hop_size = config.hop_size;
    let num_frames = frame_count(samples.len(), fft_size, hop_size);

    log::debug!(
        "Computing spectrogram: {} samples at {} Hz, fft={}, hop={}, window={}, {} frames",
        samples.len(),
        sample_rate,
        fft_size,
        hop_size,
        config.window,
        num_frames
    );

    if num_frames == 0 {
        log::warn!(
            "Audio ({} samples) shorter than one frame ({}), returning empty spectrogram",
            samples.len(),
            fft_size
        );
    }

    let mut transform = match config.window {
        WindowKind::Hann => FrameTransform::new(fft_size)?,
    };

    let half = fft_size as f32 / 2.0;
    let mut times = Vec::with_capacity(num_frames);
    let mut magnitudes = Vec::with_capacity(num_frames);

    for frame in 0..num_frames {
        cancel.check()?;
        let start = frame * hop_size;
        magnitudes.push(transform.magnitudes(&samples[start..start + fft_size]));
        times.push((start as f32 + half) / sample_rate as f32);
    }

    Ok(Spectrogram {
        sample_rate,
        fft_size,
        hop_size,
        times,
        magnitudes,
    })
}

/// Mix `audio` to mono and compute its spectrogram
pub fn compute_spectrogram_from_audio(
    audio: &dyn AudioSource,
    config: &SpectrogramConfig,
    cancel: &CancellationToken,
) -> Result<Spectrogram, AnalysisError> {
    let mono = mix_to_mono(audio)?;
    compute_spectrogram(&mono, audio.sample_rate(), config, cancel)
}
