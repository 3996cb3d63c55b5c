//! Band masking of FFT and CQT frames
//!
//! For every frame the band's interpolated bounds select a bin range; bins outside get
//! weight 0, or a raised-cosine taper of width `edge_smooth_hz` (FFT axis, in Hz) /
//! `edge_smooth_bins` (CQT axis, in bins) just outside the edges. Frames where the band
//! does not apply (disabled, outside a section) are zeroed.

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use super::model::FrequencyBand;
use crate::config::BandMaskConfig;
use crate::error::AnalysisError;
use crate::features::stats::EPSILON;
use crate::spectrum::cqt::{hz_to_cqt_bin, CqtSpectrogram};
use crate::spectrum::stft::Spectrogram;

/// Mean retention below which a band is flagged as nearly empty
pub const LOW_RETENTION_WARNING: f32 = 0.05;

/// Energy bookkeeping for one band over one run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BandDiagnostics {
    /// Mean energy fraction retained over frames where the band applies
    pub mean_energy_retained: f32,
    /// Active frames retaining less than the weak threshold
    pub weak_frame_count: usize,
    /// Active frames whose masked energy is below epsilon
    pub empty_frame_count: usize,
    /// Advisory diagnostics
    pub warnings: Vec<String>,
}

/// Masked frames plus per-frame bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedFrames {
    /// `magnitudes[frame][bin]` after masking
    pub magnitudes: Vec<Vec<f32>>,
    /// Energy fraction retained per frame, in `[0, 1]`
    pub energy_retained: Vec<f32>,
    /// Whether the band applies at each frame
    pub active: Vec<bool>,
    /// Summary over active frames
    pub diagnostics: BandDiagnostics,
}

/// Mask weight at `position` for band edges `[low, high]`
///
/// 1 inside the band, a raised-cosine falloff over `taper` outside it, 0 beyond.
pub fn raised_cosine_weight(position: f32, low: f32, high: f32, taper: f32) -> f32 {
    if position >= low && position <= high {
        return 1.0;
    }
    if taper <= 0.0 {
        return 0.0;
    }
    let distance = if position < low {
        low - position
    } else {
        position - high
    };
    if distance >= taper {
        0.0
    } else {
        0.5 * (1.0 + (PI * distance / taper).cos())
    }
}

/// Apply a band to frames whose bins sit at `positions` on the axis `to_axis` maps Hz onto
fn mask_frames(
    frames: &[Vec<f32>],
    times: &[f32],
    positions: &[f32],
    band: &FrequencyBand,
    to_axis: impl Fn(f32) -> f32,
    taper: f32,
    config: &BandMaskConfig,
) -> Result<MaskedFrames, AnalysisError> {
    config.validate()?;
    band.validate()?;
    if frames.len() != times.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "Frame count ({}) does not match time count ({})",
            frames.len(),
            times.len()
        )));
    }

    log::debug!(
        "Masking {} frames x {} bins with band '{}' (taper={})",
        frames.len(),
        positions.len(),
        band.id,
        taper
    );

    let mut magnitudes = Vec::with_capacity(frames.len());
    let mut energy_retained = Vec::with_capacity(frames.len());
    let mut active = Vec::with_capacity(frames.len());
    let mut empty_flags = Vec::with_capacity(frames.len());

    for (frame, &time) in frames.iter().zip(times) {
        let bounds = if band.enabled {
            band.bounds_at(time)
        } else {
            None
        };
        let Some((low_hz, high_hz)) = bounds else {
            magnitudes.push(vec![0.0; frame.len()]);
            energy_retained.push(0.0);
            active.push(false);
            empty_flags.push(true);
            continue;
        };

        let (low, high) = (to_axis(low_hz), to_axis(high_hz));
        let masked: Vec<f32> = frame
            .iter()
            .zip(positions)
            .map(|(&m, &pos)| m * raised_cosine_weight(pos, low, high, taper))
            .collect();

        let source_energy: f32 = frame.iter().map(|m| m * m).sum();
        let masked_energy: f32 = masked.iter().map(|m| m * m).sum();
        let retained = if source_energy <= EPSILON {
            1.0
        } else {
            (masked_energy / source_energy).clamp(0.0, 1.0)
        };

        magnitudes.push(masked);
        energy_retained.push(retained);
        active.push(true);
        empty_flags.push(masked_energy < EPSILON);
    }

    let diagnostics = summarize(band, &energy_retained, &active, &empty_flags, config);
    Ok(MaskedFrames {
        magnitudes,
        energy_retained,
        active,
        diagnostics,
    })
}

fn summarize(
    band: &FrequencyBand,
    retained: &[f32],
    active: &[bool],
    empty: &[bool],
    config: &BandMaskConfig,
) -> BandDiagnostics {
    let mut warnings = Vec::new();
    if !band.enabled {
        warnings.push(format!("Band '{}' is disabled", band.id));
    }

    let active_count = active.iter().filter(|&&a| a).count();
    if active_count == 0 {
        if band.enabled {
            warnings.push(format!("Band '{}' is not active in any frame", band.id));
        }
        for w in &warnings {
            log::warn!("{}", w);
        }
        return BandDiagnostics {
            warnings,
            ..Default::default()
        };
    }

    let mut sum = 0.0f32;
    let mut weak = 0usize;
    let mut empty_count = 0usize;
    for ((&r, &a), &e) in retained.iter().zip(active).zip(empty) {
        if !a {
            continue;
        }
        sum += r;
        if r < config.weak_retention_threshold {
            weak += 1;
        }
        if e {
            empty_count += 1;
        }
    }
    let mean = sum / active_count as f32;
    if mean < LOW_RETENTION_WARNING {
        warnings.push(format!(
            "Band '{}' retains only {:.1}% of the energy on average",
            band.id,
            mean * 100.0
        ));
    }
    for w in &warnings {
        log::warn!("{}", w);
    }

    BandDiagnostics {
        mean_energy_retained: mean,
        weak_frame_count: weak,
        empty_frame_count: empty_count,
        warnings,
    }
}

/// Mask a magnitude spectrogram with a band (FFT axis, Hz)
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid band or config.
pub fn mask_spectrogram(
    spectrogram: &Spectrogram,
    band: &FrequencyBand,
    config: &BandMaskConfig,
) -> Result<MaskedFrames, AnalysisError> {
    let freqs = spectrogram.frequencies();
    mask_frames(
        &spectrogram.magnitudes,
        &spectrogram.times,
        &freqs,
        band,
        |hz| hz,
        config.edge_smooth_hz,
        config,
    )
}

/// Mask a CQT spectrogram with a band (CQT axis, fractional bins)
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid band or config.
pub fn mask_cqt(
    cqt: &CqtSpectrogram,
    band: &FrequencyBand,
    config: &BandMaskConfig,
) -> Result<MaskedFrames, AnalysisError> {
    let positions: Vec<f32> = (0..cqt.n_bins()).map(|b| b as f32).collect();
    let f_min = cqt.config.f_min;
    let bpo = cqt.config.bins_per_octave;
    mask_frames(
        &cqt.magnitudes,
        &cqt.times,
        &positions,
        band,
        // Lower edge 0 Hz maps to -inf, which keeps every bin below the upper edge
        |hz| {
            if hz <= 0.0 {
                f32::NEG_INFINITY
            } else {
                hz_to_cqt_bin(hz, f_min, bpo)
            }
        },
        config.edge_smooth_bins,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::model::FrequencyBand;

    fn flat_spectrogram(frames: usize) -> Spectrogram {
        // 1024-point FFT at 8 kHz: 7.8125 Hz bins
        Spectrogram {
            sample_rate: 8000,
            fft_size: 1024,
            hop_size: 256,
            times: (0..frames).map(|t| t as f32 * 0.032).collect(),
            magnitudes: vec![vec![1.0; 513]; frames],
        }
    }

    #[test]
    fn test_full_spectrum_retains_everything() {
        let spec = flat_spectrogram(10);
        let band = FrequencyBand::new_constant("all", "all", 0.0, 4000.0, 1.0).unwrap();
        let masked = mask_spectrogram(&spec, &band, &BandMaskConfig::default()).unwrap();
        assert!(masked.energy_retained.iter().all(|&r| (r - 1.0).abs() < 1e-6));
        assert!((masked.diagnostics.mean_energy_retained - 1.0).abs() < 1e-6);
        assert_eq!(masked.diagnostics.weak_frame_count, 0);
        assert!(masked.diagnostics.warnings.is_empty());
    }

    #[test]
    fn test_retention_in_unit_range_and_zero_outside() {
        let spec = flat_spectrogram(5);
        let band = FrequencyBand::new_constant("b", "b", 1000.0, 2000.0, 1.0).unwrap();
        let masked = mask_spectrogram(&spec, &band, &BandMaskConfig::default()).unwrap();
        let freqs = spec.frequencies();
        for frame in &masked.magnitudes {
            for (&m, &f) in frame.iter().zip(&freqs) {
                if !(1000.0..=2000.0).contains(&f) {
                    assert_eq!(m, 0.0, "bin at {} Hz must be masked", f);
                }
            }
        }
        for &r in &masked.energy_retained {
            assert!((0.0..=1.0).contains(&r));
            // 129 of 513 bins kept
            assert!((r - 129.0 / 513.0).abs() < 1e-4, "retained {}", r);
        }
    }

    #[test]
    fn test_taper_widens_mask() {
        let spec = flat_spectrogram(1);
        let band = FrequencyBand::new_constant("b", "b", 1000.0, 2000.0, 1.0).unwrap();
        let hard = mask_spectrogram(&spec, &band, &BandMaskConfig::default()).unwrap();
        let soft_cfg = BandMaskConfig {
            edge_smooth_hz: 100.0,
            ..Default::default()
        };
        let soft = mask_spectrogram(&spec, &band, &soft_cfg).unwrap();
        assert!(soft.energy_retained[0] > hard.energy_retained[0]);
        assert!(soft.energy_retained[0] <= 1.0);
    }

    #[test]
    fn test_raised_cosine_weight() {
        assert_eq!(raised_cosine_weight(150.0, 100.0, 200.0, 50.0), 1.0);
        assert!((raised_cosine_weight(225.0, 100.0, 200.0, 50.0) - 0.5).abs() < 1e-6);
        assert_eq!(raised_cosine_weight(250.0, 100.0, 200.0, 50.0), 0.0);
        assert_eq!(raised_cosine_weight(99.0, 100.0, 200.0, 0.0), 0.0);
    }

    #[test]
    fn test_sectioned_and_disabled() {
        let spec = flat_spectrogram(10);
        // Frames at 0.0..0.288 s; section covers 0.064..0.16
        let band = FrequencyBand::new_sectioned("s", "s", 0.0, 4000.0, 0.064, 0.16).unwrap();
        let masked = mask_spectrogram(&spec, &band, &BandMaskConfig::default()).unwrap();
        assert_eq!(
            masked.active,
            vec![false, false, true, true, true, false, false, false, false, false]
        );
        assert!(masked.magnitudes[0].iter().all(|&m| m == 0.0));
        assert_eq!(masked.energy_retained[0], 0.0);

        let mut disabled = band.clone();
        disabled.enabled = false;
        let masked = mask_spectrogram(&spec, &disabled, &BandMaskConfig::default()).unwrap();
        assert!(masked.active.iter().all(|&a| !a));
        assert_eq!(masked.diagnostics.warnings.len(), 1);
    }

    #[test]
    fn test_silent_frames_count_as_retained() {
        let mut spec = flat_spectrogram(2);
        spec.magnitudes[1] = vec![0.0; 513];
        let band = FrequencyBand::new_constant("b", "b", 1000.0, 2000.0, 1.0).unwrap();
        let masked = mask_spectrogram(&spec, &band, &BandMaskConfig::default()).unwrap();
        assert_eq!(masked.energy_retained[1], 1.0);
        assert_eq!(masked.diagnostics.empty_frame_count, 1);
    }

    #[test]
    fn test_low_retention_warning() {
        let spec = flat_spectrogram(3);
        let band = FrequencyBand::new_constant("n", "narrow", 1000.0, 1010.0, 1.0).unwrap();
        let masked = mask_spectrogram(&spec, &band, &BandMaskConfig::default()).unwrap();
        assert_eq!(masked.diagnostics.weak_frame_count, 3);
        assert!(masked.diagnostics.warnings.iter().any(|w| w.contains("retains only")));
    }
}
