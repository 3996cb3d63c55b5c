//! Spectral centroid and spectral flux
//!
//! Both work on raw frame matrices so the band-scoped variants and the generic reducers can
//! reuse them on masked or restricted spectra. Activity gating is optional: without an
//! [`ActivitySignal`] every frame is treated as active.

use serde::{Deserialize, Serialize};

use super::stats::EPSILON;
use super::Signal1D;
use crate::preprocessing::activity::ActivitySignal;
use crate::spectrum::stft::Spectrogram;

/// Centroid value reported on inactive frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactiveMode {
    /// Report 0 Hz
    #[default]
    Zero,
    /// Repeat the last active frame's centroid (0 before the first one)
    HoldLast,
}

/// Spectral centroid `Σ(f·m) / Σ(m)` per frame, in Hz
///
/// Frames whose magnitude sum is below epsilon have centroid 0.
///
/// # Arguments
///
/// * `frames` - Magnitude frames
/// * `frequencies` - Center frequency of each bin
/// * `activity` - Optional gating; inactive frames follow `mode`
/// * `mode` - Value reported on inactive frames
pub fn spectral_centroid_frames(
    frames: &[Vec<f32>],
    frequencies: &[f32],
    activity: Option<&ActivitySignal>,
    mode: InactiveMode,
) -> Vec<f32> {
    let mut last = 0.0f32;
    frames
        .iter()
        .enumerate()
        .map(|(t, frame)| {
            let inactive = activity
                .map(|a| !a.is_active.get(t).copied().unwrap_or(false))
                .unwrap_or(false);
            if inactive {
                return match mode {
                    InactiveMode::Zero => 0.0,
                    InactiveMode::HoldLast => last,
                };
            }

            let (weighted, total) = frame
                .iter()
                .zip(frequencies)
                .fold((0.0f32, 0.0f32), |(w, s), (&m, &f)| (w + f * m, s + m));
            let centroid = if total > EPSILON { weighted / total } else { 0.0 };
            last = centroid;
            centroid
        })
        .collect()
}

/// L1 distance between L1-normalized consecutive frames
///
/// The first frame is 0. With an activity signal, inactive or suppressed frames are 0 and
/// clear the history, so the first frame after a gate also reads 0 instead of spiking.
pub fn spectral_flux_frames(frames: &[Vec<f32>], activity: Option<&ActivitySignal>) -> Vec<f32> {
    let mut previous: Option<Vec<f32>> = None;
    let mut flux = Vec::with_capacity(frames.len());

    for (t, frame) in frames.iter().enumerate() {
        if activity.map(|a| a.is_gated(t)).unwrap_or(false) {
            previous = None;
            flux.push(0.0);
            continue;
        }

        let sum: f32 = frame.iter().sum();
        let normalized: Vec<f32> = if sum > EPSILON {
            frame.iter().map(|&m| m / sum).collect()
        } else {
            vec![0.0; frame.len()]
        };

        let value = match &previous {
            Some(prev) => prev
                .iter()
                .zip(&normalized)
                .map(|(a, b)| (b - a).abs())
                .sum(),
            None => 0.0,
        };
        flux.push(value);
        previous = Some(normalized);
    }

    flux
}

/// Spectral centroid of a spectrogram
pub fn spectral_centroid(
    spectrogram: &Spectrogram,
    activity: Option<&ActivitySignal>,
    mode: InactiveMode,
) -> Signal1D {
    log::debug!(
        "Computing spectral centroid: {} frames, gating={}",
        spectrogram.num_frames(),
        activity.is_some()
    );
    let values = spectral_centroid_frames(
        &spectrogram.magnitudes,
        &spectrogram.frequencies(),
        activity,
        mode,
    );
    Signal1D::new(spectrogram.times.clone(), values)
}

/// Spectral flux of a spectrogram
pub fn spectral_flux(spectrogram: &Spectrogram, activity: Option<&ActivitySignal>) -> Signal1D {
    log::debug!(
        "Computing spectral flux: {} frames, gating={}",
        spectrogram.num_frames(),
        activity.is_some()
    );
    let values = spectral_flux_frames(&spectrogram.magnitudes, activity);
    Signal1D::new(spectrogram.times.clone(), values)
}
