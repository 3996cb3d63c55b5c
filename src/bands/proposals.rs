//! Band proposals from the long-term mel spectrum
//!
//! Peaks of the time-averaged (linear) mel spectrum mark where the energy of a recording
//! concentrates. Each peak is widened down to the neighbouring minima on both sides and
//! becomes a constant global band; proposals are ranked by the share of total energy their
//! region holds.

use serde::{Deserialize, Serialize};

use super::model::{BandProvenance, FrequencyBand};
use crate::config::{BandProposalConfig, MelConfig};
use crate::error::AnalysisError;
use crate::features::stats::EPSILON;
use crate::spectrum::mel::MelFilterbank;
use crate::spectrum::stft::Spectrogram;

/// Provenance method name for proposals from this module
pub const PROPOSAL_METHOD: &str = "mel-peak";

/// A suggested band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandProposal {
    /// The band, ready to use
    pub band: FrequencyBand,
    /// Share of total long-term energy inside the band, in `[0, 1]`
    pub salience: f32,
    /// Center frequency of the peak mel band in Hz
    pub center_hz: f32,
}

/// Ranked proposals
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BandProposalResult {
    /// Proposals by descending salience
    pub proposals: Vec<BandProposal>,
    /// Advisory diagnostics
    pub warnings: Vec<String>,
}

/// Index range `[left, right]` reached by descending from `peak` on both sides
fn region_around(spectrum: &[f32], peak: usize) -> (usize, usize) {
    let mut left = peak;
    while left > 0 && spectrum[left - 1] < spectrum[left] {
        left -= 1;
    }
    let mut right = peak;
    while right + 1 < spectrum.len() && spectrum[right + 1] < spectrum[right] {
        right += 1;
    }
    (left, right)
}

/// Propose bands for a spectrogram
///
/// # Arguments
///
/// * `spectrogram` - Magnitude spectrogram of the source
/// * `source_id` - Written into each proposed band
/// * `config` - Mel resolution and ranking limits
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid config or an unusable spectrogram
/// geometry. Empty or silent input returns no proposals with a warning.
pub fn propose_bands(
    spectrogram: &Spectrogram,
    source_id: &str,
    config: &BandProposalConfig,
) -> Result<BandProposalResult, AnalysisError> {
    config.validate()?;

    log::debug!(
        "Proposing bands: {} frames, {} mel bands, up to {} proposals",
        spectrogram.num_frames(),
        config.n_mels,
        config.max_proposals
    );

    if spectrogram.is_empty() {
        let msg = "Spectrogram is empty; no bands proposed".to_string();
        log::warn!("{}", msg);
        return Ok(BandProposalResult {
            proposals: Vec::new(),
            warnings: vec![msg],
        });
    }

    let mel_config = MelConfig {
        n_mels: config.n_mels,
        ..Default::default()
    };
    let bank = MelFilterbank::new(&mel_config, spectrogram.fft_size, spectrogram.sample_rate)?;

    // Step 1: long-term linear mel spectrum
    let mut spectrum = vec![0.0f32; bank.n_mels()];
    for frame in &spectrogram.magnitudes {
        for (acc, v) in spectrum.iter_mut().zip(bank.project(frame)) {
            *acc += v;
        }
    }
    let frames = spectrogram.num_frames() as f32;
    spectrum.iter_mut().for_each(|v| *v /= frames);

    let total: f32 = spectrum.iter().sum();
    if total <= EPSILON {
        let msg = "Spectrogram is silent; no bands proposed".to_string();
        log::warn!("{}", msg);
        return Ok(BandProposalResult {
            proposals: Vec::new(),
            warnings: vec![msg],
        });
    }

    let duration = spectrogram.times.last().copied().unwrap_or(0.0)
        + spectrogram.fft_size as f32 / (2.0 * spectrogram.sample_rate as f32);
    let n = spectrum.len();

    // Step 2: peaks and their regions
    let mut proposals = Vec::new();
    for i in 0..n {
        let left_ok = i == 0 || spectrum[i] > spectrum[i - 1];
        let right_ok = i + 1 == n || spectrum[i] >= spectrum[i + 1];
        if !(left_ok && right_ok) || spectrum[i] <= EPSILON {
            continue;
        }

        let (left, right) = region_around(&spectrum, i);
        let low_hz = if left == 0 {
            bank.f_min
        } else {
            bank.center_frequencies[left]
        };
        let high_hz = if right + 1 == n {
            bank.f_max
        } else {
            bank.center_frequencies[right]
        };
        if high_hz <= low_hz {
            continue;
        }

        let salience = spectrum[left..=right].iter().sum::<f32>() / total;
        if salience < config.min_salience {
            continue;
        }

        let mut band = FrequencyBand::new_constant(
            String::new(),
            format!("{:.0}-{:.0} Hz", low_hz, high_hz),
            low_hz,
            high_hz,
            duration,
        )?;
        band.source_id = source_id.to_string();
        band.provenance = BandProvenance::Proposal {
            method: PROPOSAL_METHOD.to_string(),
        };

        proposals.push(BandProposal {
            band,
            salience: salience.min(1.0),
            center_hz: bank.center_frequencies[i],
        });
    }

    // Step 3: rank
    proposals.sort_by(|a, b| {
        b.salience
            .total_cmp(&a.salience)
            .then(a.center_hz.total_cmp(&b.center_hz))
    });
    proposals.truncate(config.max_proposals);
    for (rank, p) in proposals.iter_mut().enumerate() {
        p.band.id = format!("proposal-{}", rank);
        p.band.sort_order = rank as i32;
    }

    log::debug!("Proposed {} bands", proposals.len());

    Ok(BandProposalResult {
        proposals,
        warnings: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::config::SpectrogramConfig;
    use crate::spectrum::stft::compute_spectrogram;
    use std::f32::consts::PI;

    const SR: u32 = 16000;

    fn spectrogram(samples: &[f32]) -> Spectrogram {
        let cfg = SpectrogramConfig {
            fft_size: 1024,
            hop_size: 512,
            ..Default::default()
        };
        compute_spectrogram(samples, SR, &cfg, &CancellationToken::none()).unwrap()
    }

    #[test]
    fn test_two_tones_give_two_bands() {
        let samples: Vec<f32> = (0..SR as usize)
            .map(|i| {
                let t = i as f32 / SR as f32;
                0.6 * (2.0 * PI * 200.0 * t).sin() + 0.3 * (2.0 * PI * 3000.0 * t).sin()
            })
            .collect();
        let spec = spectrogram(&samples);
        let result = propose_bands(&spec, "mix", &BandProposalConfig::default()).unwrap();

        assert!(result.warnings.is_empty());
        assert!(result.proposals.len() >= 2);
        let covers = |hz: f32| {
            result.proposals.iter().any(|p| {
                let (low, high) = p.band.bounds_at(0.5).unwrap();
                low <= hz && hz <= high
            })
        };
        assert!(covers(200.0), "no proposal covers 200 Hz");
        assert!(covers(3000.0), "no proposal covers 3 kHz");

        let top = &result.proposals[0];
        assert_eq!(top.band.id, "proposal-0");
        assert_eq!(top.band.source_id, "mix");
        assert_eq!(
            top.band.provenance,
            BandProvenance::Proposal {
                method: PROPOSAL_METHOD.to_string()
            }
        );
        for pair in result.proposals.windows(2) {
            assert!(pair[0].salience >= pair[1].salience);
        }
        assert!(result.proposals.iter().all(|p| p.band.validate().is_ok()));
    }

    #[test]
    fn test_silent_and_empty_warn() {
        let silent = spectrogram(&vec![0.0; 8000]);
        let result = propose_bands(&silent, "s", &BandProposalConfig::default()).unwrap();
        assert!(result.proposals.is_empty());
        assert_eq!(result.warnings.len(), 1);

        let empty = spectrogram(&[0.0; 100]);
        let result = propose_bands(&empty, "e", &BandProposalConfig::default()).unwrap();
        assert!(result.proposals.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_max_proposals_respected() {
        let samples: Vec<f32> = (0..SR as usize)
            .map(|i| {
                let t = i as f32 / SR as f32;
                [150.0f32, 600.0, 1800.0, 4000.0, 6500.0]
                    .iter()
                    .map(|f| 0.15 * (2.0 * PI * f * t).sin())
                    .sum()
            })
            .collect();
        let cfg = BandProposalConfig {
            max_proposals: 2,
            min_salience: 0.0,
            ..Default::default()
        };
        let result = propose_bands(&spectrogram(&samples), "m", &cfg).unwrap();
        assert_eq!(result.proposals.len(), 2);
    }
}
