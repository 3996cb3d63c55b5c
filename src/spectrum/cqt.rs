//! Constant-Q projection
//!
//! Maps STFT magnitudes onto logarithmically spaced bins `f_k = f_min · 2^(k / bpo)` whose
//! bandwidth grows with frequency (`bw_k = f_k / Q`, `Q = 1 / (2^(1/bpo) - 1)`). Each CQT bin
//! is a triangular kernel over the STFT bins inside its bandwidth, normalized to unit sum.
//!
//! The STFT size is chosen from the lowest bin's bandwidth (capped at 16384) and the hop
//! defaults to a quarter of it. Kernel banks depend only on
//! `(bins_per_octave, f_min, f_max, fft_size, sample_rate)` and are memoized process-wide.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use serde::{Deserialize, Serialize};

use super::stft::{compute_spectrogram, Spectrogram};
use crate::cancel::CancellationToken;
use crate::config::{CqtConfig, SpectrogramConfig, WindowKind};
use crate::error::AnalysisError;

/// Largest STFT size the CQT will select
pub const MAX_CQT_FFT_SIZE: usize = 16384;

/// Smallest STFT size the CQT will select
pub const MIN_CQT_FFT_SIZE: usize = 512;

/// Quality factor for `bins_per_octave`
pub fn q_factor(bins_per_octave: u32) -> f32 {
    1.0 / (2.0f32.powf(1.0 / bins_per_octave as f32) - 1.0)
}

/// Frequency of (fractional) CQT bin `bin`
pub fn cqt_bin_to_hz(bin: f32, f_min: f32, bins_per_octave: u32) -> f32 {
    f_min * 2.0f32.powf(bin / bins_per_octave as f32)
}

/// Fractional CQT bin of `hz`
pub fn hz_to_cqt_bin(hz: f32, f_min: f32, bins_per_octave: u32) -> f32 {
    bins_per_octave as f32 * (hz / f_min).log2()
}

/// STFT size whose resolution resolves the lowest CQT bin's bandwidth
pub fn select_fft_size(sample_rate: u32, f_min: f32, bins_per_octave: u32) -> usize {
    let required = sample_rate as f32 * q_factor(bins_per_octave) / f_min;
    let size = (required.ceil().max(1.0) as usize).next_power_of_two();
    size.clamp(MIN_CQT_FFT_SIZE, MAX_CQT_FFT_SIZE)
}

/// One CQT kernel over STFT bins `start_bin..start_bin + weights.len()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CqtKernel {
    /// First STFT bin covered
    pub start_bin: usize,
    /// Unit-sum triangular weights
    pub weights: Vec<f32>,
}

/// Precomputed kernels for one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CqtKernelBank {
    /// Bins per octave
    pub bins_per_octave: u32,
    /// Frequency of bin 0 in Hz
    pub f_min: f32,
    /// Upper frequency after clamping to Nyquist
    pub f_max: f32,
    /// STFT size the kernels index into
    pub fft_size: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Center frequency of each CQT bin
    pub bin_frequencies: Vec<f32>,
    /// Kernels, one per CQT bin
    pub kernels: Vec<CqtKernel>,
}

impl CqtKernelBank {
    /// Build kernels for the given configuration
    pub fn build(
        bins_per_octave: u32,
        f_min: f32,
        f_max: f32,
        fft_size: usize,
        sample_rate: u32,
    ) -> Result<Self, AnalysisError> {
        if bins_per_octave == 0 {
            return Err(AnalysisError::InvalidInput(
                "bins_per_octave must be > 0".to_string(),
            ));
        }
        if sample_rate == 0 || fft_size == 0 || !fft_size.is_power_of_two() {
            return Err(AnalysisError::InvalidInput(format!(
                "Invalid CQT framing: fft_size={}, sample_rate={}",
                fft_size, sample_rate
            )));
        }
        let nyquist = sample_rate as f32 / 2.0;
        let f_max = f_max.min(nyquist);
        if f_min <= 0.0 || f_max <= f_min {
            return Err(AnalysisError::InvalidInput(format!(
                "CQT range invalid after clamping to Nyquist: f_min={}, f_max={}",
                f_min, f_max
            )));
        }

        let q = q_factor(bins_per_octave);
        let n_bins = (bins_per_octave as f32 * (f_max / f_min).log2() + 1e-4).floor() as usize + 1;
        let n_fft_bins = fft_size / 2 + 1;
        let bins_per_hz = fft_size as f32 / sample_rate as f32;

        let mut bin_frequencies = Vec::with_capacity(n_bins);
        let mut kernels = Vec::with_capacity(n_bins);

        for k in 0..n_bins {
            let freq = cqt_bin_to_hz(k as f32, f_min, bins_per_octave);
            let center = freq * bins_per_hz;
            let half_width = ((freq / q) * bins_per_hz / 2.0).max(1.0);

            let lo = (center - half_width).ceil().max(0.0) as usize;
            let hi = ((center + half_width).floor() as usize).min(n_fft_bins - 1);

            let mut weights = Vec::with_capacity(hi.saturating_sub(lo) + 1);
            for bin in lo..=hi {
                weights.push((1.0 - (bin as f32 - center).abs() / half_width).max(0.0));
            }
            let sum: f32 = weights.iter().sum();

            let kernel = if sum > 0.0 && lo <= hi {
                CqtKernel {
                    start_bin: lo,
                    weights: weights.into_iter().map(|w| w / sum).collect(),
                }
            } else {
                CqtKernel {
                    start_bin: (center.round() as usize).min(n_fft_bins - 1),
                    weights: vec![1.0],
                }
            };

            bin_frequencies.push(freq);
            kernels.push(kernel);
        }

        log::debug!(
            "Built CQT kernel bank: {} bins ({} per octave), {:.2}-{:.1} Hz, Q={:.2}, fft={}",
            n_bins,
            bins_per_octave,
            f_min,
            f_max,
            q,
            fft_size
        );

        Ok(Self {
            bins_per_octave,
            f_min,
            f_max,
            fft_size,
            sample_rate,
            bin_frequencies,
            kernels,
        })
    }

    /// Number of CQT bins
    pub fn n_bins(&self) -> usize {
        self.kernels.len()
    }

    /// Project one STFT magnitude frame
    pub fn project(&self, magnitudes: &[f32]) -> Vec<f32> {
        self.kernels
            .iter()
            .map(|kernel| {
                kernel
                    .weights
                    .iter()
                    .enumerate()
                    .map(|(i, &w)| w * magnitudes.get(kernel.start_bin + i).copied().unwrap_or(0.0))
                    .sum()
            })
            .collect()
    }
}

/// Cache key: the configuration a kernel bank is a pure function of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KernelKey {
    bins_per_octave: u32,
    f_min_bits: u32,
    f_max_bits: u32,
    fft_size: usize,
    sample_rate: u32,
}

impl KernelKey {
    /// Key for the given configuration
    pub fn new(
        bins_per_octave: u32,
        f_min: f32,
        f_max: f32,
        fft_size: usize,
        sample_rate: u32,
    ) -> Self {
        Self {
            bins_per_octave,
            f_min_bits: f_min.to_bits(),
            f_max_bits: f_max.to_bits(),
            fft_size,
            sample_rate,
        }
    }
}

type KernelCache = RwLock<HashMap<KernelKey, Arc<CqtKernelBank>>>;

fn kernel_cache() -> &'static KernelCache {
    static CACHE: OnceLock<KernelCache> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Fetch (or build and memoize) the kernel bank for a configuration
///
/// Entries are immutable once inserted; two threads racing on the same key both build the
/// bank and the first insert wins.
pub fn kernel_bank(
    bins_per_octave: u32,
    f_min: f32,
    f_max: f32,
    fft_size: usize,
    sample_rate: u32,
) -> Result<Arc<CqtKernelBank>, AnalysisError> {
    let key = KernelKey::new(bins_per_octave, f_min, f_max, fft_size, sample_rate);
    {
        let cache = kernel_cache().read().unwrap_or_else(|e| e.into_inner());
        if let Some(bank) = cache.get(&key) {
            return Ok(Arc::clone(bank));
        }
    }

    let bank = Arc::new(CqtKernelBank::build(
        bins_per_octave,
        f_min,
        f_max,
        fft_size,
        sample_rate,
    )?);
    let mut cache = kernel_cache().write().unwrap_or_else(|e| e.into_inner());
    Ok(Arc::clone(cache.entry(key).or_insert(bank)))
}

/// Number of memoized kernel banks
pub fn cached_kernel_banks() -> usize {
    kernel_cache().read().unwrap_or_else(|e| e.into_inner()).len()
}

/// Constant-Q spectrogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CqtSpectrogram {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Configuration with the hop size resolved
    pub config: CqtConfig,
    /// Frame times in seconds
    pub times: Vec<f32>,
    /// `magnitudes[frame][bin]`
    pub magnitudes: Vec<Vec<f32>>,
    /// Number of octaves spanned (rounded up)
    pub n_octaves: usize,
    /// Center frequency of each bin in Hz
    pub bin_frequencies: Vec<f32>,
}

impl CqtSpectrogram {
    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.magnitudes.len()
    }

    /// Number of CQT bins
    pub fn n_bins(&self) -> usize {
        self.bin_frequencies.len()
    }

    /// Frequency of (fractional) bin `bin`
    pub fn bin_to_hz(&self, bin: f32) -> f32 {
        cqt_bin_to_hz(bin, self.config.f_min, self.config.bins_per_octave)
    }

    /// Fractional bin of `hz`
    pub fn hz_to_bin(&self, hz: f32) -> f32 {
        hz_to_cqt_bin(hz, self.config.f_min, self.config.bins_per_octave)
    }

    /// Copy with new magnitudes (same framing and bins)
    pub fn with_magnitudes(&self, magnitudes: Vec<Vec<f32>>) -> CqtSpectrogram {
        CqtSpectrogram {
            sample_rate: self.sample_rate,
            config: self.config.clone(),
            times: self.times.clone(),
            magnitudes,
            n_octaves: self.n_octaves,
            bin_frequencies: self.bin_frequencies.clone(),
        }
    }
}

/// Project an existing spectrogram onto CQT bins
///
/// The spectrogram's FFT size is used as-is; [`compute_cqt`] picks one suited to `f_min`.
pub fn project_cqt(
    spectrogram: &Spectrogram,
    config: &CqtConfig,
    cancel: &CancellationToken,
) -> Result<CqtSpectrogram, AnalysisError> {
    config.validate()?;
    let bank = kernel_bank(
        config.bins_per_octave,
        config.f_min,
        config.f_max,
        spectrogram.fft_size,
        spectrogram.sample_rate,
    )?;

    let mut magnitudes = Vec::with_capacity(spectrogram.num_frames());
    for frame in &spectrogram.magnitudes {
        cancel.check()?;
        magnitudes.push(bank.project(frame));
    }

    let n_bins = bank.n_bins();
    let bpo = config.bins_per_octave as usize;
    Ok(CqtSpectrogram {
        sample_rate: spectrogram.sample_rate,
        config: CqtConfig {
            hop_size: Some(spectrogram.hop_size),
            f_max: bank.f_max,
            ..config.clone()
        },
        times: spectrogram.times.clone(),
        magnitudes,
        n_octaves: n_bins.div_ceil(bpo),
        bin_frequencies: bank.bin_frequencies.clone(),
    })
}

/// Compute a constant-Q spectrogram from mono samples
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for invalid configs and
/// `AnalysisError::Cancelled` if the token fires during framing or projection.
pub fn compute_cqt(
    samples: &[f32],
    sample_rate: u32,
    config: &CqtConfig,
    cancel: &CancellationToken,
) -> Result<CqtSpectrogram, AnalysisError> {
    config.validate()?;
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate".to_string()));
    }

    let fft_size = select_fft_size(sample_rate, config.f_min, config.bins_per_octave);
    let hop_size = config.hop_size.unwrap_or(fft_size / 4).min(fft_size);

    log::debug!(
        "Computing CQT: {} samples at {} Hz, {} bins/octave, fft={}, hop={}",
        samples.len(),
        sample_rate,
        config.bins_per_octave,
        fft_size,
        hop_size
    );

    let stft_config = SpectrogramConfig {
        fft_size,
        hop_size,
        window: WindowKind::Hann,
    };
    let spectrogram = compute_spectrogram(samples, sample_rate, &stft_config, cancel)?;
    project_cqt(&spectrogram, config, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_bin_mapping_roundtrip() {
        let f_min = 32.70;
        for &bpo in &[12u32, 24, 36] {
            for &f in &[40.0f32, 110.0, 440.0, 1234.5, 7900.0] {
                let back = cqt_bin_to_hz(hz_to_cqt_bin(f, f_min, bpo), f_min, bpo);
                assert!((back - f).abs() < 1e-3 * f, "bpo={} f={} back={}", bpo, f, back);
            }
        }
    }

    #[test]
    fn test_q_factor() {
        // 12 bins/octave: Q = 1 / (2^(1/12) - 1) ~ 16.82
        assert!((q_factor(12) - 16.817).abs() < 0.01);
    }

    #[test]
    fn test_select_fft_size_capped() {
        assert_eq!(select_fft_size(44100, 32.70, 24), MAX_CQT_FFT_SIZE);
        let size = select_fft_size(8000, 1000.0, 12);
        assert!(size.is_power_of_two());
        assert!(size >= MIN_CQT_FFT_SIZE && size <= MAX_CQT_FFT_SIZE);
    }

    #[test]
    fn test_kernels_unit_sum() {
        let bank = CqtKernelBank::build(24, 55.0, 4000.0, 8192, 22050).unwrap();
        assert_eq!(bank.n_bins(), (24.0f32 * (4000.0f32 / 55.0).log2()).floor() as usize + 1);
        for kernel in &bank.kernels {
            let sum: f32 = kernel.weights.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_kernel_bank_memoized() {
        let a = kernel_bank(12, 61.0, 2000.0, 4096, 16000).unwrap();
        let b = kernel_bank(12, 61.0, 2000.0, 4096, 16000).unwrap();
        assert!(Arc::ptr_eq(&a, &b), "same key must return the cached bank");
        assert!(cached_kernel_banks() >= 1);

        let c = kernel_bank(12, 61.0, 2000.0, 8192, 16000).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_invalid_configs() {
        let cfg = CqtConfig {
            bins_per_octave: 0,
            ..Default::default()
        };
        assert!(compute_cqt(&[0.0; 1000], 22050, &cfg, &CancellationToken::none()).is_err());

        let cfg = CqtConfig {
            f_min: 500.0,
            f_max: 200.0,
            ..Default::default()
        };
        assert!(compute_cqt(&[0.0; 1000], 22050, &cfg, &CancellationToken::none()).is_err());
    }

    #[test]
    fn test_tone_peak_bin() {
        let sr = 22050;
        let samples: Vec<f32> = (0..sr * 2)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sr as f32).sin() * 0.5)
            .collect();
        let cfg = CqtConfig {
            bins_per_octave: 12,
            f_min: 55.0,
            f_max: 3520.0,
            hop_size: Some(2048),
        };
        let cqt = compute_cqt(&samples, sr, &cfg, &CancellationToken::none()).unwrap();
        assert!(cqt.num_frames() > 0);
        assert_eq!(cqt.n_octaves, 7);
        assert_eq!(cqt.config.hop_size, Some(2048));

        let frame = &cqt.magnitudes[cqt.num_frames() / 2];
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // 440 Hz is three octaves above 55 Hz
        assert_eq!(peak, 36);
        assert!((cqt.bin_to_hz(peak as f32) - 440.0).abs() < 0.5);
    }

    #[test]
    fn test_default_hop_is_quarter_fft() {
        let cfg = CqtConfig {
            bins_per_octave: 12,
            f_min: 200.0,
            f_max: 4000.0,
            hop_size: None,
        };
        let fft = select_fft_size(16000, 200.0, 12);
        let samples = vec![0.0f32; fft * 2];
        let cqt = compute_cqt(&samples, 16000, &cfg, &CancellationToken::none()).unwrap();
        assert_eq!(cqt.config.hop_size, Some(fft / 4));
    }
}
