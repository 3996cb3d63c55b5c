//! Band-scoped feature extraction
//!
//! Each 1D extractor has a band counterpart that runs on masked frames. The band's own
//! activity signal gates centroid, flux and onset exactly as the unscoped extractors are
//! gated by the full-spectrum activity. Its noise floor is estimated only over frames where
//! the band applies, and frames outside the band's sections are inactive.

use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::mask::{mask_cqt, mask_spectrogram, BandDiagnostics, MaskedFrames};
use super::model::FrequencyBand;
use crate::cancel::CancellationToken;
use crate::config::{ActivityConfig, BandMaskConfig, MelConfig, OnsetConfig, OnsetSource, PeakPickConfig};
use crate::error::AnalysisError;
use crate::events::peak_picking::{pick_peaks, EventStream};
use crate::features::cqt_signals::{cqt_signal, CqtSignalKind};
use crate::features::onset::envelope::{onset_envelope, OnsetInput};
use crate::features::spectral::{spectral_centroid, spectral_flux, InactiveMode};
use crate::features::Signal1D;
use crate::preprocessing::activity::{compute_activity_where, frame_energy_db, ActivitySignal};
use crate::spectrum::cqt::CqtSpectrogram;
use crate::spectrum::mel::compute_mel_spectrogram;
use crate::spectrum::stft::Spectrogram;

/// STFT-based extractors available per band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandMirFunction {
    /// Spectral centroid of the band
    SpectralCentroid,
    /// Spectral flux of the band
    SpectralFlux,
    /// Onset envelope of the band
    OnsetEnvelope,
    /// RMS amplitude of the band, estimated from its spectrum
    AmplitudeEnvelope,
}

/// Parameters shared by band-scoped extractors
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BandAnalysisConfig {
    /// Mask construction
    pub mask: BandMaskConfig,
    /// Band activity gating
    pub activity: ActivityConfig,
    /// Onset envelope parameters
    pub onset: OnsetConfig,
    /// Mel projection for mel-sourced onsets
    pub mel: MelConfig,
    /// Peak picking for band events
    pub peak_pick: PeakPickConfig,
}

/// 1D feature of one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandMir1DResult {
    /// Band id
    pub band_id: String,
    /// Band label
    pub band_label: String,
    /// Extractor that produced the signal
    pub function: BandMirFunction,
    /// The feature over time
    pub signal: Signal1D,
    /// Masking diagnostics
    pub diagnostics: BandDiagnostics,
}

/// CQT-derived signal of one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandCqt1DResult {
    /// Band id
    pub band_id: String,
    /// Band label
    pub band_label: String,
    /// Signal kind
    pub kind: CqtSignalKind,
    /// The signal over time
    pub signal: Signal1D,
    /// Masking diagnostics
    pub diagnostics: BandDiagnostics,
}

/// Onset events of one band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandEventsResult {
    /// Band id
    pub band_id: String,
    /// Band label
    pub band_label: String,
    /// Peaks of the band's onset envelope
    pub events: EventStream,
    /// Masking diagnostics
    pub diagnostics: BandDiagnostics,
}

/// Activity of the masked spectrogram over the frames where the band applies
pub fn band_activity(
    masked: &Spectrogram,
    mask: &MaskedFrames,
    config: &ActivityConfig,
) -> Result<ActivitySignal, AnalysisError> {
    compute_activity_where(&masked.times, frame_energy_db(masked), &mask.active, config)
}

/// RMS estimate per frame from Hann-windowed magnitudes
///
/// A full-scale sine peaks at `fft_size / 4` in its main bin with two side bins at half
/// that, so `Σ(4m/N)² / 3` recovers its mean square.
pub fn spectral_rms(spectrogram: &Spectrogram) -> Vec<f32> {
    let scale = 4.0 / spectrogram.fft_size.max(1) as f32;
    spectrogram
        .magnitudes
        .iter()
        .map(|frame| {
            let energy: f32 = frame.iter().map(|&m| (m * scale) * (m * scale)).sum();
            (energy / 3.0).sqrt()
        })
        .collect()
}

fn onset_for_band(
    masked: &Spectrogram,
    activity: &ActivitySignal,
    config: &BandAnalysisConfig,
) -> Result<Signal1D, AnalysisError> {
    match config.onset.source {
        OnsetSource::Mel => {
            let mel = compute_mel_spectrogram(masked, &config.mel)?;
            onset_envelope(OnsetInput::Mel(&mel), &config.onset, Some(activity))
        }
        OnsetSource::Spectrogram => {
            onset_envelope(OnsetInput::Spectrogram(masked), &config.onset, Some(activity))
        }
    }
}

/// Compute one STFT-based feature inside a band
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid band or config.
pub fn band_mir_1d(
    spectrogram: &Spectrogram,
    band: &FrequencyBand,
    function: BandMirFunction,
    config: &BandAnalysisConfig,
) -> Result<BandMir1DResult, AnalysisError> {
    log::debug!("Band '{}': computing {:?}", band.id, function);

    let mask = mask_spectrogram(spectrogram, band, &config.mask)?;
    let masked = spectrogram.with_magnitudes(mask.magnitudes.clone());
    let activity = band_activity(&masked, &mask, &config.activity)?;

    let signal = match function {
        BandMirFunction::SpectralCentroid => {
            spectral_centroid(&masked, Some(&activity), InactiveMode::Zero)
        }
        BandMirFunction::SpectralFlux => spectral_flux(&masked, Some(&activity)),
        BandMirFunction::OnsetEnvelope => onset_for_band(&masked, &activity, config)?,
        BandMirFunction::AmplitudeEnvelope => {
            Signal1D::new(masked.times.clone(), spectral_rms(&masked))
        }
    };

    Ok(BandMir1DResult {
        band_id: band.id.clone(),
        band_label: band.label.clone(),
        function,
        signal,
        diagnostics: mask.diagnostics,
    })
}

/// Compute one CQT-derived signal inside a band
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid band or config.
pub fn band_cqt_1d(
    cqt: &CqtSpectrogram,
    band: &FrequencyBand,
    kind: CqtSignalKind,
    config: &BandMaskConfig,
) -> Result<BandCqt1DResult, AnalysisError> {
    log::debug!("Band '{}': computing {:?} on CQT", band.id, kind);

    let mask = mask_cqt(cqt, band, config)?;
    let masked = cqt.with_magnitudes(mask.magnitudes);
    let signal = cqt_signal(&masked, kind);

    Ok(BandCqt1DResult {
        band_id: band.id.clone(),
        band_label: band.label.clone(),
        kind,
        signal,
        diagnostics: mask.diagnostics,
    })
}

/// Peak-pick the band's onset envelope
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid band or config.
pub fn band_events(
    spectrogram: &Spectrogram,
    band: &FrequencyBand,
    config: &BandAnalysisConfig,
) -> Result<BandEventsResult, AnalysisError> {
    let onset = band_mir_1d(spectrogram, band, BandMirFunction::OnsetEnvelope, config)?;
    let events = pick_peaks(&onset.signal, &config.peak_pick)?;
    log::debug!("Band '{}': {} events", band.id, events.events.len());

    Ok(BandEventsResult {
        band_id: onset.band_id,
        band_label: onset.band_label,
        events,
        diagnostics: onset.diagnostics,
    })
}

/// Evaluate `function` for several bands on one spectrogram
///
/// Cancellation is checked before each band. With the `parallel` feature bands run on the
/// rayon pool; results keep the input order either way.
///
/// # Errors
///
/// Returns the first band error, or `AnalysisError::Cancelled`.
pub fn band_mir_1d_batch(
    spectrogram: &Spectrogram,
    bands: &[FrequencyBand],
    function: BandMirFunction,
    config: &BandAnalysisConfig,
    cancel: &CancellationToken,
) -> Result<Vec<BandMir1DResult>, AnalysisError> {
    log::debug!("Band batch: {:?} over {} bands", function, bands.len());
    let run = |band: &FrequencyBand| {
        cancel.check()?;
        band_mir_1d(spectrogram, band, function, config)
    };

    #[cfg(feature = "parallel")]
    {
        bands.par_iter().map(run).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        bands.iter().map(run).collect()
    }
}

/// Evaluate a CQT signal for several bands on one CQT spectrogram
///
/// # Errors
///
/// Returns the first band error, or `AnalysisError::Cancelled`.
pub fn band_cqt_1d_batch(
    cqt: &CqtSpectrogram,
    bands: &[FrequencyBand],
    kind: CqtSignalKind,
    config: &BandMaskConfig,
    cancel: &CancellationToken,
) -> Result<Vec<BandCqt1DResult>, AnalysisError> {
    log::debug!("Band batch: {:?} over {} bands", kind, bands.len());
    let run = |band: &FrequencyBand| {
        cancel.check()?;
        band_cqt_1d(cqt, band, kind, config)
    };

    #[cfg(feature = "parallel")]
    {
        bands.par_iter().map(run).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        bands.iter().map(run).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CqtConfig, SpectrogramConfig};
    use crate::spectrum::cqt::compute_cqt;
    use crate::spectrum::stft::compute_spectrogram;
    use std::f32::consts::PI;

    const SR: u32 = 8000;

    /// 200 Hz and 2 kHz tones; the high one alternates between loud and soft every 0.25 s
    fn two_tone(seconds: f32) -> Vec<f32> {
        let n = (seconds * SR as f32) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / SR as f32;
                let level = if (t / 0.25) as usize % 2 == 0 { 0.4 } else { 0.15 };
                0.5 * (2.0 * PI * 200.0 * t).sin() + level * (2.0 * PI * 2000.0 * t).sin()
            })
            .collect()
    }

    fn spectrogram(samples: &[f32]) -> Spectrogram {
        let cfg = SpectrogramConfig {
            fft_size: 512,
            hop_size: 128,
            ..Default::default()
        };
        compute_spectrogram(samples, SR, &cfg, &CancellationToken::none()).unwrap()
    }

    #[test]
    fn test_band_centroid_tracks_band_content() {
        let spec = spectrogram(&two_tone(1.0));
        let low = FrequencyBand::new_constant("low", "low", 50.0, 500.0, 1.0).unwrap();
        let result =
            band_mir_1d(&spec, &low, BandMirFunction::SpectralCentroid, &BandAnalysisConfig::default())
                .unwrap();
        assert_eq!(result.band_id, "low");
        assert_eq!(result.signal.len(), spec.num_frames());
        let active: Vec<f32> = result.signal.values.iter().copied().filter(|&v| v > 0.0).collect();
        assert!(!active.is_empty());
        for v in active {
            assert!((150.0..=260.0).contains(&v), "low-band centroid {} Hz", v);
        }
    }

    #[test]
    fn test_band_amplitude_estimates_rms() {
        let spec = spectrogram(&two_tone(1.0));
        let low = FrequencyBand::new_constant("low", "low", 50.0, 500.0, 1.0).unwrap();
        let result =
            band_mir_1d(&spec, &low, BandMirFunction::AmplitudeEnvelope, &BandAnalysisConfig::default())
                .unwrap();
        let expected = 0.5 / 2.0f32.sqrt();
        let mid = result.signal.values[result.signal.len() / 2];
        assert!((mid - expected).abs() < 0.05, "band RMS {} vs {}", mid, expected);
    }

    #[test]
    fn test_band_events_follow_gated_tone() {
        let spec = spectrogram(&two_tone(2.0));
        let high = FrequencyBand::new_constant("high", "high", 1500.0, 2500.0, 2.0).unwrap();
        let cfg = BandAnalysisConfig {
            onset: OnsetConfig {
                source: OnsetSource::Spectrogram,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = band_events(&spec, &high, &cfg).unwrap();
        // Loud sections start at 0.5, 1.0 and 1.5 s
        let times = result.events.times();
        for onset in [0.5f32, 1.0, 1.5] {
            assert!(
                times.iter().any(|t| (t - onset).abs() < 0.06),
                "no event near {} s in {:?}",
                onset,
                times
            );
        }
    }

    #[test]
    fn test_batch_preserves_order_and_cancels() {
        let spec = spectrogram(&two_tone(0.5));
        let bands = vec![
            FrequencyBand::new_constant("a", "a", 50.0, 500.0, 0.5).unwrap(),
            FrequencyBand::new_constant("b", "b", 1500.0, 2500.0, 0.5).unwrap(),
        ];
        let cfg = BandAnalysisConfig::default();
        let results = band_mir_1d_batch(
            &spec,
            &bands,
            BandMirFunction::SpectralFlux,
            &cfg,
            &CancellationToken::none(),
        )
        .unwrap();
        assert_eq!(
            results.iter().map(|r| r.band_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let cancelled = band_mir_1d_batch(
            &spec,
            &bands,
            BandMirFunction::SpectralFlux,
            &cfg,
            &CancellationToken::from_fn(|| true),
        );
        assert_eq!(cancelled, Err(AnalysisError::Cancelled));
    }

    /// Low-level noise with loud 1 kHz bursts (0.1 s every 0.5 s)
    fn noisy_bursts(seconds: f32) -> Vec<f32> {
        let n = (seconds * SR as f32) as usize;
        let mut state = 0x2545_f491u32;
        (0..n)
            .map(|i| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let noise = (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0;
                let t = i as f32 / SR as f32;
                let burst = if t % 0.5 < 0.1 { 0.8 * (2.0 * PI * 1000.0 * t).sin() } else { 0.0 };
                0.01 * noise + burst
            })
            .collect()
    }

    fn nearest_frame(times: &[f32], t: f32) -> usize {
        times
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 - t).abs().total_cmp(&(b.1 - t).abs()))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_sectioned_band_floor_ignores_frames_outside_section() {
        let spec = spectrogram(&noisy_bursts(6.0));
        let band = FrequencyBand::new_sectioned("mid", "mid", 20.0, 3900.0, 2.0, 4.0).unwrap();
        let mask = mask_spectrogram(&spec, &band, &BandMaskConfig::default()).unwrap();
        let masked = spec.with_magnitudes(mask.magnitudes.clone());
        let activity = band_activity(&masked, &mask, &ActivityConfig::default()).unwrap();

        let section: Vec<usize> = (0..spec.num_frames()).filter(|&t| mask.active[t]).collect();
        assert!(!section.is_empty());
        // More than 10% of the run lies outside the section
        assert!(section.len() < spec.num_frames() / 2);

        let unscoped = crate::preprocessing::activity::compute_activity(&spec, &ActivityConfig::default())
            .unwrap();
        assert!(
            (activity.diagnostics.noise_floor - unscoped.diagnostics.noise_floor).abs() < 6.0,
            "band floor {} dB vs full-run floor {} dB",
            activity.diagnostics.noise_floor,
            unscoped.diagnostics.noise_floor
        );
        assert!(activity.diagnostics.enter_threshold > -60.0);

        let active_in_section = section.iter().filter(|&&t| activity.is_active[t]).count();
        assert!(active_in_section > 0);
        assert!(
            active_in_section < section.len() * 3 / 4,
            "{} of {} section frames active",
            active_in_section,
            section.len()
        );

        // Noise between bursts is gated, bursts are not
        assert!(!activity.is_active[nearest_frame(&spec.times, 2.35)]);
        assert!(activity.is_active[nearest_frame(&spec.times, 3.05)]);
        // Outside the section nothing is active
        assert!(!activity.is_active[nearest_frame(&spec.times, 1.05)]);
        assert!(!activity.is_active[nearest_frame(&spec.times, 5.05)]);
    }

    #[test]
    fn test_band_cqt_signal() {
        let samples = two_tone(1.0);
        let cqt_cfg = CqtConfig {
            bins_per_octave: 12,
            f_min: 55.0,
            f_max: 3500.0,
            hop_size: None,
        };
        let cqt = compute_cqt(&samples, SR, &cqt_cfg, &CancellationToken::none()).unwrap();
        let bass = FrequencyBand::new_constant("bass", "bass", 20.0, 400.0, 1.0).unwrap();
        let result =
            band_cqt_1d(&cqt, &bass, CqtSignalKind::BassPitchMotion, &BandMaskConfig::default())
                .unwrap();
        assert_eq!(result.signal.len(), cqt.num_frames());
        assert!(result.signal.values.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(result.diagnostics.mean_energy_retained > 0.3);
    }
}
