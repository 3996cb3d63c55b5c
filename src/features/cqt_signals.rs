//! CQT-derived 1D signals
//!
//! - **Harmonic energy**: energy at the first 6 harmonics of the frame's strongest bin,
//!   each weighted `1/h`, relative to total frame energy
//! - **Bass pitch motion**: frame-to-frame change of the energy-weighted bin centroid
//!   restricted to 20–300 Hz
//! - **Tonal stability**: inverse of the variance of the 12-bin chroma distribution over a
//!   sliding window of ~20 frames
//!
//! Every signal is min-max normalized to `[0, 1]` per run, so a flat signal reads as zeros.

use serde::{Deserialize, Serialize};

use super::stats::{min_max_normalize, EPSILON};
use super::Signal1D;
use crate::spectrum::cqt::CqtSpectrogram;

/// Harmonics considered for harmonic energy
pub const NUM_HARMONICS: usize = 6;

/// Bass range for pitch motion in Hz
pub const BASS_RANGE_HZ: (f32, f32) = (20.0, 300.0);

/// Sliding window for tonal stability in frames
pub const STABILITY_WINDOW: usize = 20;

/// Variance scale in `1 / (1 + scale · var)`
const STABILITY_SCALE: f32 = 100.0;

/// Reference C for pitch classes (C0)
const C0_HZ: f32 = 16.351_6;

/// Which CQT signal to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CqtSignalKind {
    /// Harmonic-series energy ratio
    HarmonicEnergy,
    /// Bass centroid motion
    BassPitchMotion,
    /// Chroma stability
    TonalStability,
}

/// Harmonic energy ratio per frame (not normalized)
fn harmonic_energy_raw(frames: &[Vec<f32>], bins_per_octave: u32) -> Vec<f32> {
    let offsets: Vec<usize> = (1..=NUM_HARMONICS)
        .map(|h| (bins_per_octave as f32 * (h as f32).log2()).round() as usize)
        .collect();

    frames
        .iter()
        .map(|frame| {
            let energy: Vec<f32> = frame.iter().map(|&m| m * m).collect();
            let total: f32 = energy.iter().sum();
            if total < EPSILON {
                return 0.0;
            }
            let root = energy
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let harmonic: f32 = offsets
                .iter()
                .enumerate()
                .filter_map(|(i, &off)| energy.get(root + off).map(|&e| e / (i + 1) as f32))
                .sum();
            harmonic / total
        })
        .collect()
}

/// Absolute change of the bass centroid (in bins) per frame (not normalized)
fn bass_pitch_motion_raw(frames: &[Vec<f32>], bin_frequencies: &[f32]) -> Vec<f32> {
    let bass: Vec<usize> = bin_frequencies
        .iter()
        .enumerate()
        .filter(|(_, &f)| f >= BASS_RANGE_HZ.0 && f <= BASS_RANGE_HZ.1)
        .map(|(i, _)| i)
        .collect();

    let mut previous: Option<f32> = None;
    frames
        .iter()
        .map(|frame| {
            let (weighted, total) = bass.iter().fold((0.0f32, 0.0f32), |(w, s), &b| {
                let e = frame.get(b).map(|&m| m * m).unwrap_or(0.0);
                (w + b as f32 * e, s + e)
            });
            let centroid = (total > EPSILON).then(|| weighted / total);
            let motion = match (previous, centroid) {
                (Some(p), Some(c)) => (c - p).abs(),
                _ => 0.0,
            };
            previous = centroid;
            motion
        })
        .collect()
}

/// Pitch class (0 = C) of every bin
fn pitch_classes(bin_frequencies: &[f32]) -> Vec<usize> {
    bin_frequencies
        .iter()
        .map(|&f| ((12.0 * (f / C0_HZ).log2()).round() as i64).rem_euclid(12) as usize)
        .collect()
}

/// Chroma stability per frame (not normalized)
fn tonal_stability_raw(frames: &[Vec<f32>], bin_frequencies: &[f32]) -> Vec<f32> {
    let classes = pitch_classes(bin_frequencies);
    let chroma: Vec<[f32; 12]> = frames
        .iter()
        .map(|frame| {
            let mut c = [0.0f32; 12];
            for (&m, &pc) in frame.iter().zip(&classes) {
                c[pc] += m * m;
            }
            let sum: f32 = c.iter().sum();
            if sum > EPSILON {
                c.iter_mut().for_each(|v| *v /= sum);
            }
            c
        })
        .collect();

    let n = chroma.len();
    let half = STABILITY_WINDOW / 2;
    (0..n)
        .map(|t| {
            let start = t.saturating_sub(half);
            let end = (t + half).max(t + 1).min(n);
            let window = &chroma[start..end];
            let len = window.len() as f32;
            let variance: f32 = (0..12)
                .map(|pc| {
                    let mean = window.iter().map(|c| c[pc]).sum::<f32>() / len;
                    window.iter().map(|c| (c[pc] - mean).powi(2)).sum::<f32>() / len
                })
                .sum::<f32>()
                / 12.0;
            1.0 / (1.0 + STABILITY_SCALE * variance)
        })
        .collect()
}

/// CQT signal over raw frames, min-max normalized
///
/// # Arguments
///
/// * `frames` - CQT magnitudes `frames[frame][bin]`
/// * `bin_frequencies` - Center frequency of each CQT bin
/// * `bins_per_octave` - CQT resolution
/// * `kind` - Signal to compute
pub fn cqt_signal_frames(
    frames: &[Vec<f32>],
    bin_frequencies: &[f32],
    bins_per_octave: u32,
    kind: CqtSignalKind,
) -> Vec<f32> {
    let raw = match kind {
        CqtSignalKind::HarmonicEnergy => harmonic_energy_raw(frames, bins_per_octave),
        CqtSignalKind::BassPitchMotion => bass_pitch_motion_raw(frames, bin_frequencies),
        CqtSignalKind::TonalStability => tonal_stability_raw(frames, bin_frequencies),
    };
    min_max_normalize(&raw)
}

/// Compute a CQT-derived signal
pub fn cqt_signal(cqt: &CqtSpectrogram, kind: CqtSignalKind) -> Signal1D {
    log::debug!(
        "Computing {:?}: {} frames x {} CQT bins",
        kind,
        cqt.num_frames(),
        cqt.n_bins()
    );
    let values = cqt_signal_frames(
        &cqt.magnitudes,
        &cqt.bin_frequencies,
        cqt.config.bins_per_octave,
        kind,
    );
    Signal1D::new(cqt.times.clone(), values)
}

/// Harmonic energy of a CQT spectrogram
pub fn harmonic_energy(cqt: &CqtSpectrogram) -> Signal1D {
    cqt_signal(cqt, CqtSignalKind::HarmonicEnergy)
}

/// Bass pitch motion of a CQT spectrogram
pub fn bass_pitch_motion(cqt: &CqtSpectrogram) -> Signal1D {
    cqt_signal(cqt, CqtSignalKind::BassPitchMotion)
}

/// Tonal stability of a CQT spectrogram
pub fn tonal_stability(cqt: &CqtSpectrogram) -> Signal1D {
    cqt_signal(cqt, CqtSignalKind::TonalStability)
}
