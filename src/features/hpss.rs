//! Harmonic/percussive source separation (HPSS)
//!
//! Median filtering across time enhances horizontal (harmonic) structure, median filtering
//! across frequency enhances vertical (percussive) structure. The two enhanced spectrograms
//! give soft Wiener-style masks `H^p / (H^p + P^p)` or binary masks, which are applied to
//! the original magnitudes so that soft masks split each bin's energy without loss.
//!
//! Mask estimation ([`estimate_hpss_masks`]) is the inner loop an accelerator may replace;
//! mask application always runs here.
//!
//! # Reference
//!
//! Fitzgerald, D. (2010). Harmonic/Percussive Separation using Median Filtering.
//! *Proc. DAFx-10*.

use serde::{Deserialize, Serialize};

use super::stats::EPSILON;
use crate::cancel::CancellationToken;
use crate::config::{HpssConfig, HpssMaskKind};
use crate::error::AnalysisError;
use crate::spectrum::stft::Spectrogram;

/// Per-bin harmonic and percussive masks in `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpssMasks {
    /// `harmonic[frame][bin]`
    pub harmonic: Vec<Vec<f32>>,
    /// `percussive[frame][bin]`
    pub percussive: Vec<Vec<f32>>,
}

impl HpssMasks {
    /// Largest absolute difference to `other`, or `None` if the shapes differ
    pub fn max_abs_difference(&self, other: &HpssMasks) -> Option<f32> {
        let same_shape = |a: &[Vec<f32>], b: &[Vec<f32>]| {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.len() == y.len())
        };
        if !same_shape(&self.harmonic, &other.harmonic)
            || !same_shape(&self.percussive, &other.percussive)
        {
            return None;
        }
        let diff = |a: &[Vec<f32>], b: &[Vec<f32>]| {
            a.iter()
                .flatten()
                .zip(b.iter().flatten())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0f32, f32::max)
        };
        Some(diff(&self.harmonic, &other.harmonic).max(diff(&self.percussive, &other.percussive)))
    }
}

/// Separated spectrograms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HpssResult {
    /// Harmonic part (original magnitudes × harmonic mask)
    pub harmonic: Spectrogram,
    /// Percussive part (original magnitudes × percussive mask)
    pub percussive: Spectrogram,
}

/// Median of `window` (upper median for even lengths), reordering it in place
fn median_in_place(window: &mut [f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let mid = window.len() / 2;
    let (_, m, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Median filter along time for every bin, window truncated at the edges
///
/// # Errors
///
/// Returns `AnalysisError::Cancelled` if the token fires (polled once per bin).
pub fn median_filter_time(
    frames: &[Vec<f32>],
    kernel: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>, AnalysisError> {
    let n_frames = frames.len();
    let n_bins = frames.first().map(Vec::len).unwrap_or(0);
    let half = (kernel | 1) / 2;
    let mut out = vec![vec![0.0f32; n_bins]; n_frames];
    let mut scratch = Vec::with_capacity(2 * half + 1);

    for bin in 0..n_bins {
        cancel.check()?;
        for t in 0..n_frames {
            let start = t.saturating_sub(half);
            let end = (t + half + 1).min(n_frames);
            scratch.clear();
            scratch.extend(frames[start..end].iter().map(|f| f[bin]));
            out[t][bin] = median_in_place(&mut scratch);
        }
    }
    Ok(out)
}

/// Median filter along frequency for every frame, window truncated at the edges
///
/// # Errors
///
/// Returns `AnalysisError::Cancelled` if the token fires (polled once per frame).
pub fn median_filter_frequency(
    frames: &[Vec<f32>],
    kernel: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>, AnalysisError> {
    let half = (kernel | 1) / 2;
    let mut scratch = Vec::with_capacity(2 * half + 1);
    frames
        .iter()
        .map(|frame| {
            cancel.check()?;
            let n_bins = frame.len();
            let row: Vec<f32> = (0..n_bins)
                .map(|bin| {
                    let start = bin.saturating_sub(half);
                    let end = (bin + half + 1).min(n_bins);
                    scratch.clear();
                    scratch.extend_from_slice(&frame[start..end]);
                    median_in_place(&mut scratch)
                })
                .collect();
            Ok::<_, AnalysisError>(row)
        })
        .collect()
}

/// Combine enhanced spectrograms into masks
fn masks_from_enhanced(
    harmonic_enhanced: &[Vec<f32>],
    percussive_enhanced: &[Vec<f32>],
    config: &HpssConfig,
) -> HpssMasks {
    let mut harmonic = Vec::with_capacity(harmonic_enhanced.len());
    let mut percussive = Vec::with_capacity(harmonic_enhanced.len());

    for (h_frame, p_frame) in harmonic_enhanced.iter().zip(percussive_enhanced) {
        let (mut h_mask, mut p_mask) = (Vec::with_capacity(h_frame.len()), Vec::with_capacity(h_frame.len()));
        for (&h, &p) in h_frame.iter().zip(p_frame) {
            let (mh, mp) = match config.mask {
                HpssMaskKind::Soft => {
                    let hp = h.max(0.0).powf(config.power);
                    let pp = p.max(0.0).powf(config.power);
                    let denom = hp + pp;
                    if denom <= EPSILON {
                        (0.5, 0.5)
                    } else {
                        (hp / denom, pp / denom)
                    }
                }
                HpssMaskKind::Hard => {
                    let is_harmonic = h > config.margin * p;
                    let is_percussive = !is_harmonic && p >= config.margin * h;
                    (
                        if is_harmonic { 1.0 } else { 0.0 },
                        if is_percussive { 1.0 } else { 0.0 },
                    )
                }
            };
            h_mask.push(mh);
            p_mask.push(mp);
        }
        harmonic.push(h_mask);
        percussive.push(p_mask);
    }

    HpssMasks {
        harmonic,
        percussive,
    }
}

/// Estimate harmonic/percussive masks from magnitude frames
///
/// # Arguments
///
/// * `frames` - Magnitudes `frames[frame][bin]`
/// * `config` - Kernel sizes (forced odd) and mask parameters
/// * `cancel` - Polled once per bin in the time filter and once per frame in the frequency
///   filter
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for invalid configs or ragged frames, and
/// `AnalysisError::Cancelled` if the token fires.
pub fn estimate_hpss_masks(
    frames: &[Vec<f32>],
    config: &HpssConfig,
    cancel: &CancellationToken,
) -> Result<HpssMasks, AnalysisError> {
    config.validate()?;
    let n_bins = frames.first().map(Vec::len).unwrap_or(0);
    if frames.iter().any(|f| f.len() != n_bins) {
        return Err(AnalysisError::InvalidInput(
            "HPSS input frames have inconsistent bin counts".to_string(),
        ));
    }

    log::debug!(
        "Estimating HPSS masks: {} frames x {} bins, kernels=({}, {}), mask={:?}",
        frames.len(),
        n_bins,
        config.harmonic_kernel | 1,
        config.percussive_kernel | 1,
        config.mask
    );

    let harmonic_enhanced = median_filter_time(frames, config.harmonic_kernel, cancel)?;
    let percussive_enhanced = median_filter_frequency(frames, config.percussive_kernel, cancel)?;

    Ok(masks_from_enhanced(
        &harmonic_enhanced,
        &percussive_enhanced,
        config,
    ))
}

/// Apply masks to the original magnitudes
///
/// # Errors
///
/// Returns `AnalysisError::ProcessingError` if the mask shape does not match the
/// spectrogram, and `AnalysisError::Cancelled` if the token fires.
pub fn apply_hpss_masks(
    spectrogram: &Spectrogram,
    masks: &HpssMasks,
    cancel: &CancellationToken,
) -> Result<HpssResult, AnalysisError> {
    if masks.harmonic.len() != spectrogram.num_frames()
        || masks.percussive.len() != spectrogram.num_frames()
    {
        return Err(AnalysisError::ProcessingError(format!(
            "HPSS mask has {} frames, spectrogram has {}",
            masks.harmonic.len(),
            spectrogram.num_frames()
        )));
    }

    let mut harmonic = Vec::with_capacity(spectrogram.num_frames());
    let mut percussive = Vec::with_capacity(spectrogram.num_frames());
    for ((frame, h_mask), p_mask) in spectrogram
        .magnitudes
        .iter()
        .zip(&masks.harmonic)
        .zip(&masks.percussive)
    {
        cancel.check()?;
        if h_mask.len() != frame.len() || p_mask.len() != frame.len() {
            return Err(AnalysisError::ProcessingError(
                "HPSS mask bin count does not match spectrogram".to_string(),
            ));
        }
        harmonic.push(frame.iter().zip(h_mask).map(|(m, w)| m * w).collect());
        percussive.push(frame.iter().zip(p_mask).map(|(m, w)| m * w).collect());
    }

    Ok(HpssResult {
        harmonic: spectrogram.with_magnitudes(harmonic),
        percussive: spectrogram.with_magnitudes(percussive),
    })
}

/// Separate a spectrogram into harmonic and percussive parts (CPU reference path)
pub fn hpss(
    spectrogram: &Spectrogram,
    config: &HpssConfig,
    cancel: &CancellationToken,
) -> Result<HpssResult, AnalysisError> {
    let masks = estimate_hpss_masks(&spectrogram.magnitudes, config, cancel)?;
    apply_hpss_masks(spectrogram, &masks, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Steady horizontal line at bin 10 plus a vertical click at frame 20
    fn line_and_click() -> Vec<Vec<f32>> {
        let mut frames = vec![vec![0.0f32; 64]; 40];
        for (t, frame) in frames.iter_mut().enumerate() {
            frame[10] = 1.0;
            if t == 20 {
                frame.iter_mut().for_each(|m| *m += 0.8);
            }
        }
        frames
    }

    fn spectrogram(frames: Vec<Vec<f32>>) -> Spectrogram {
        let n = frames.len();
        Spectrogram {
            sample_rate: 8000,
            fft_size: 126,
            hop_size: 63,
            times: (0..n).map(|i| i as f32 * 0.01).collect(),
            magnitudes: frames,
        }
    }

    #[test]
    fn test_median_filters() {
        let frames = vec![vec![0.0, 5.0, 0.0], vec![0.0, 0.0, 0.0], vec![9.0, 0.0, 0.0]];
        let none = CancellationToken::none();
        let t = median_filter_time(&frames, 3, &none).unwrap();
        assert_eq!(t[1], vec![0.0, 0.0, 0.0], "isolated values removed across time");
        let f = median_filter_frequency(&frames, 3, &none).unwrap();
        assert_eq!(f[0][1], 0.0, "isolated peak removed across frequency");
    }

    #[test]
    fn test_soft_masks_sum_to_one() {
        let masks = estimate_hpss_masks(&line_and_click(), &HpssConfig::default(), &CancellationToken::none()).unwrap();
        for (h, p) in masks.harmonic.iter().flatten().zip(masks.percussive.iter().flatten()) {
            assert!((h + p - 1.0).abs() < 1e-5);
            assert!((0.0..=1.0).contains(h));
        }
    }

    #[test]
    fn test_line_is_harmonic_click_is_percussive() {
        let spec = spectrogram(line_and_click());
        let result = hpss(&spec, &HpssConfig::default(), &CancellationToken::none()).unwrap();

        // Steady line (away from the click) lands in the harmonic part
        assert!(result.harmonic.magnitudes[5][10] > 0.9);
        assert!(result.percussive.magnitudes[5][10] < 0.1);

        // Broadband click off the line lands in the percussive part
        assert!(result.percussive.magnitudes[20][40] > 0.7);
        assert!(result.harmonic.magnitudes[20][40] < 0.1);
    }

    #[test]
    fn test_soft_masks_preserve_magnitude() {
        let spec = spectrogram(line_and_click());
        let result = hpss(&spec, &HpssConfig::default(), &CancellationToken::none()).unwrap();
        for t in 0..spec.num_frames() {
            for b in 0..64 {
                let sum = result.harmonic.magnitudes[t][b] + result.percussive.magnitudes[t][b];
                assert!((sum - spec.magnitudes[t][b]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_hard_masks_binary() {
        let cfg = HpssConfig {
            mask: HpssMaskKind::Hard,
            ..Default::default()
        };
        let masks = estimate_hpss_masks(&line_and_click(), &cfg, &CancellationToken::none()).unwrap();
        assert!(masks
            .harmonic
            .iter()
            .flatten()
            .chain(masks.percussive.iter().flatten())
            .all(|&m| m == 0.0 || m == 1.0));
        assert_eq!(masks.harmonic[5][10], 1.0);
    }

    #[test]
    fn test_cancelled() {
        let token = CancellationToken::from_fn(|| true);
        assert_eq!(
            estimate_hpss_masks(&line_and_click(), &HpssConfig::default(), &token),
            Err(AnalysisError::Cancelled)
        );
    }

    #[test]
    fn test_polled_per_bin_and_per_frame() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let frames = line_and_click();
        let (n_frames, n_bins) = (frames.len(), frames[0].len());
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let token = CancellationToken::from_fn(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            false
        });
        estimate_hpss_masks(&frames, &HpssConfig::default(), &token).unwrap();
        assert!(polls.load(Ordering::Relaxed) >= n_bins + n_frames);

        // Fires part-way through the time filter
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);
        let token = CancellationToken::from_fn(move || counter.fetch_add(1, Ordering::Relaxed) >= 4);
        assert_eq!(
            median_filter_time(&frames, 9, &token),
            Err(AnalysisError::Cancelled)
        );
        assert_eq!(polls.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_mask_difference() {
        let a = estimate_hpss_masks(&line_and_click(), &HpssConfig::default(), &CancellationToken::none()).unwrap();
        assert_eq!(a.max_abs_difference(&a), Some(0.0));
        let empty = HpssMasks {
            harmonic: vec![],
            percussive: vec![],
        };
        assert_eq!(a.max_abs_difference(&empty), None);
    }
}
