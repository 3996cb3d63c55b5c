//! Mel filterbank projection
//!
//! Builds `n_mels` triangular filters over `n_mels + 2` points spaced evenly on the HTK mel
//! scale, projects linear STFT magnitudes onto them and log-compresses the result with
//! `log10(eps + x)`.
//!
//! The projection itself ([`MelFilterbank::project_frames`]) is the inner loop an
//! accelerator may replace; log compression always runs on the CPU so both paths share the
//! same output transform.

use serde::{Deserialize, Serialize};

use super::stft::Spectrogram;
use crate::config::MelConfig;
use crate::error::AnalysisError;

/// Log-compression floor
pub const MEL_EPSILON: f32 = 1e-10;

/// Hz to mel (HTK formula)
pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Mel to Hz (HTK formula)
pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

/// One triangular filter, stored sparsely from `start_bin`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelFilter {
    /// First STFT bin with a non-zero weight
    pub start_bin: usize,
    /// Weights for bins `start_bin..start_bin + weights.len()`
    pub weights: Vec<f32>,
}

/// Triangular mel filterbank for a fixed FFT size and sample rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelFilterbank {
    /// FFT size the filters were built for
    pub fft_size: usize,
    /// Sample rate the filters were built for
    pub sample_rate: u32,
    /// Lower edge in Hz after clamping
    pub f_min: f32,
    /// Upper edge in Hz after clamping
    pub f_max: f32,
    /// Center frequency of each filter in Hz
    pub center_frequencies: Vec<f32>,
    /// Filters, one per mel band
    pub filters: Vec<MelFilter>,
}

impl MelFilterbank {
    /// Build the filterbank
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` for `n_mels == 0`, a zero sample rate, a
    /// non-power-of-two FFT size or a range that collapses after clamping to Nyquist.
    pub fn new(
        config: &MelConfig,
        fft_size: usize,
        sample_rate: u32,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        if sample_rate == 0 {
            return Err(AnalysisError::InvalidInput("Invalid sample rate".to_string()));
        }
        if fft_size == 0 || !fft_size.is_power_of_two() {
            return Err(AnalysisError::InvalidInput(format!(
                "fft_size must be a power of two, got {}",
                fft_size
            )));
        }
        let (f_min, f_max) = config.resolve_range(sample_rate)?;

        let n_mels = config.n_mels;
        let n_bins = fft_size / 2 + 1;
        let bin_hz = sample_rate as f32 / fft_size as f32;

        let mel_lo = hz_to_mel(f_min);
        let mel_hi = hz_to_mel(f_max);
        let hz_points: Vec<f32> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_lo + (mel_hi - mel_lo) * i as f32 / (n_mels + 1) as f32))
            .collect();

        let mut filters = Vec::with_capacity(n_mels);
        for m in 0..n_mels {
            let (lower, center, upper) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            let first = (lower / bin_hz).floor().max(0.0) as usize;
            let last = ((upper / bin_hz).ceil() as usize).min(n_bins - 1);

            let mut start_bin = None;
            let mut weights = Vec::new();
            for bin in first..=last {
                let f = bin as f32 * bin_hz;
                let w = if f > lower && f <= center {
                    (f - lower) / (center - lower)
                } else if f > center && f < upper {
                    (upper - f) / (upper - center)
                } else {
                    0.0
                };
                if w > 0.0 {
                    if start_bin.is_none() {
                        start_bin = Some(bin);
                    }
                    weights.push(w);
                } else if start_bin.is_some() {
                    break;
                }
            }

            // Filters narrower than one bin collapse onto the nearest bin
            let filter = match start_bin {
                Some(start_bin) => MelFilter { start_bin, weights },
                None => MelFilter {
                    start_bin: ((center / bin_hz).round() as usize).min(n_bins - 1),
                    weights: vec![1.0],
                },
            };
            filters.push(filter);
        }

        log::debug!(
            "Built mel filterbank: {} bands, {:.1}-{:.1} Hz, fft={}, sr={}",
            n_mels,
            f_min,
            f_max,
            fft_size,
            sample_rate
        );

        Ok(Self {
            fft_size,
            sample_rate,
            f_min,
            f_max,
            center_frequencies: hz_points[1..=n_mels].to_vec(),
            filters,
        })
    }

    /// Number of mel bands
    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    /// Linear projection of one magnitude frame
    pub fn project(&self, magnitudes: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|filter| {
                filter
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(i, &w)| w * magnitudes.get(filter.start_bin + i).copied().unwrap_or(0.0))
                    .sum()
            })
            .collect()
    }

    /// Linear projection of every frame (the accelerated inner loop)
    pub fn project_frames(&self, frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
        frames.iter().map(|f| self.project(f)).collect()
    }
}

/// Log-mel spectrogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelSpectrogram {
    /// Frame times in seconds (same as the source spectrogram)
    pub times: Vec<f32>,
    /// `mel_bands[frame][mel]` = `log10(eps + projected)`
    pub mel_bands: Vec<Vec<f32>>,
    /// Center frequency of each band in Hz
    pub band_frequencies: Vec<f32>,
}

impl MelSpectrogram {
    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.mel_bands.len()
    }

    /// Number of mel bands
    pub fn n_mels(&self) -> usize {
        self.band_frequencies.len()
    }

    /// Assemble from linear projections, applying `log10(eps + x)`
    pub fn from_projected(
        times: Vec<f32>,
        projected: Vec<Vec<f32>>,
        band_frequencies: Vec<f32>,
    ) -> Self {
        let mel_bands = projected
            .into_iter()
            .map(|frame| {
                frame
                    .into_iter()
                    .map(|v| (MEL_EPSILON + v.max(0.0)).log10())
                    .collect()
            })
            .collect();
        Self {
            times,
            mel_bands,
            band_frequencies,
        }
    }
}

/// Project a spectrogram onto log-mel bands (CPU reference path)
pub fn compute_mel_spectrogram(
    spectrogram: &Spectrogram,
    config: &MelConfig,
) -> Result<MelSpectrogram, AnalysisError> {
    let bank = MelFilterbank::new(config, spectrogram.fft_size, spectrogram.sample_rate)?;
    log::debug!(
        "Computing mel spectrogram: {} frames -> {} bands",
        spectrogram.num_frames(),
        bank.n_mels()
    );
    let projected = bank.project_frames(&spectrogram.magnitudes);
    Ok(MelSpectrogram::from_projected(
        spectrogram.times.clone(),
        projected,
        bank.center_frequencies.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::config::SpectrogramConfig;
    use crate::spectrum::stft::compute_spectrogram;
    use std::f32::consts::PI;

    #[test]
    fn test_mel_hz_roundtrip() {
        for &f in &[0.0f32, 20.0, 440.0, 1000.0, 8000.0, 20000.0] {
            let back = mel_to_hz(hz_to_mel(f));
            assert!(
                (back - f).abs() <= 1e-3 * f.max(1.0),
                "roundtrip of {} gave {}",
                f,
                back
            );
        }
        // 1000 Hz is ~1000 mel on the HTK scale
        assert!((hz_to_mel(1000.0) - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_filterbank_shape() {
        let cfg = MelConfig {
            n_mels: 40,
            f_min: 0.0,
            f_max: 0.0,
        };
        let bank = MelFilterbank::new(&cfg, 2048, 44100).unwrap();
        assert_eq!(bank.n_mels(), 40);
        assert_eq!(bank.f_max, 22050.0);
        for filter in &bank.filters {
            assert!(!filter.weights.is_empty());
            assert!(filter.weights.iter().all(|&w| w > 0.0 && w <= 1.0 + 1e-6));
            assert!(filter.start_bin + filter.weights.len() <= 1025);
        }
        // Centers strictly increasing
        for w in bank.center_frequencies.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn test_narrow_low_filters_not_empty() {
        let cfg = MelConfig {
            n_mels: 128,
            f_min: 0.0,
            f_max: 8000.0,
        };
        let bank = MelFilterbank::new(&cfg, 256, 16000).unwrap();
        assert!(bank.filters.iter().all(|f| !f.weights.is_empty()));
    }

    #[test]
    fn test_invalid_configs() {
        let bad_range = MelConfig {
            n_mels: 40,
            f_min: 4000.0,
            f_max: 1000.0,
        };
        assert!(MelFilterbank::new(&bad_range, 2048, 44100).is_err());

        let zero = MelConfig {
            n_mels: 0,
            ..Default::default()
        };
        assert!(MelFilterbank::new(&zero, 2048, 44100).is_err());
        assert!(MelFilterbank::new(&MelConfig::default(), 1000, 44100).is_err());
    }

    #[test]
    fn test_tone_lands_in_matching_band() {
        let sr = 16000;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 1000.0 * i as f32 / sr as f32).sin())
            .collect();
        let spec = compute_spectrogram(
            &samples,
            sr,
            &SpectrogramConfig {
                fft_size: 1024,
                hop_size: 512,
                ..Default::default()
            },
            &CancellationToken::none(),
        )
        .unwrap();
        let mel = compute_mel_spectrogram(
            &spec,
            &MelConfig {
                n_mels: 40,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(mel.num_frames(), spec.num_frames());

        let frame = &mel.mel_bands[mel.num_frames() / 2];
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        let center = mel.band_frequencies[peak];
        assert!(
            (center - 1000.0).abs() < 150.0,
            "peak band center {} should be near 1000 Hz",
            center
        );
    }

    #[test]
    fn test_silence_is_log_floor() {
        let mel = MelSpectrogram::from_projected(vec![0.0], vec![vec![0.0, 0.0]], vec![100.0, 200.0]);
        assert!(mel.mel_bands[0].iter().all(|&v| (v + 10.0).abs() < 1e-4));
    }
}
