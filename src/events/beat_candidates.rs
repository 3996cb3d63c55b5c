//! Beat-candidate detection
//!
//! Builds a salience signal `onset_weight · z(onset) + flux_weight · z(flux)`, smooths it,
//! min-max normalizes it and peak-picks with a relaxed threshold. The goal is coverage:
//! candidates are dense and noisy, tempo inference downstream sorts them out.

use serde::{Deserialize, Serialize};

use super::peak_picking::{density_warnings, find_peak_indices, Event};
use crate::config::BeatCandidateConfig;
use crate::error::AnalysisError;
use crate::features::stats::{
    frame_period, mean_std, min_max_normalize, moving_average_centered, ms_to_frames, z_score,
};
use crate::features::Signal1D;

/// Where a beat candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateSource {
    /// Peak of the onset/flux salience signal
    #[default]
    Salience,
    /// Supplied by the caller (e.g. tapped or imported)
    External,
}

/// A possible beat location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatCandidate {
    /// Time in seconds
    pub time: f32,
    /// Salience at the candidate, in `[0, 1]`
    pub strength: f32,
    /// Origin of the candidate
    pub source: CandidateSource,
}

impl From<&BeatCandidate> for Event {
    fn from(candidate: &BeatCandidate) -> Self {
        Event {
            time: candidate.time,
            weight: candidate.strength,
        }
    }
}

/// Beat candidates with the salience signal they were picked from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatCandidateResult {
    /// Candidates ordered by time
    pub candidates: Vec<BeatCandidate>,
    /// Smoothed, normalized salience
    pub salience: Option<Signal1D>,
    /// Advisory diagnostics
    pub warnings: Vec<String>,
}

/// Detect beat candidates from an onset envelope and spectral flux on the same frames
///
/// # Arguments
///
/// * `onset` - Onset envelope
/// * `flux` - Spectral flux (same time axis as `onset`)
/// * `config` - Salience weights, smoothing and peak parameters
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid config or mismatched signals.
pub fn detect_beat_candidates(
    onset: &Signal1D,
    flux: &Signal1D,
    config: &BeatCandidateConfig,
) -> Result<BeatCandidateResult, AnalysisError> {
    config.validate()?;
    if onset.len() != flux.len() || onset.times.len() != onset.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "Onset ({} frames) and flux ({} frames) must share one time axis",
            onset.len(),
            flux.len()
        )));
    }

    log::debug!(
        "Detecting beat candidates: {} frames, weights onset={} flux={}",
        onset.len(),
        config.onset_weight,
        config.flux_weight
    );

    if onset.is_empty() {
        log::warn!("No frames for beat-candidate detection");
        return Ok(BeatCandidateResult {
            candidates: Vec::new(),
            salience: None,
            warnings: vec!["No frames available for beat-candidate detection".to_string()],
        });
    }

    // Step 1: z-scored blend
    let onset_z = z_score(&onset.values);
    let flux_z = z_score(&flux.values);
    let blended: Vec<f32> = onset_z
        .iter()
        .zip(&flux_z)
        .map(|(o, f)| config.onset_weight * o + config.flux_weight * f)
        .collect();

    // Step 2: smooth and normalize
    let period = frame_period(&onset.times, 0.0);
    let window = ms_to_frames(config.smooth_ms, period);
    let smoothed = if window > 1 {
        moving_average_centered(&blended, window | 1)
    } else {
        blended
    };
    let salience = min_max_normalize(&smoothed);

    // Step 3: relaxed peak picking
    let (mean, std) = mean_std(&salience);
    let threshold = mean + config.adaptive_factor * std;
    let indices = find_peak_indices(&salience, &onset.times, threshold, config.min_interval_sec);

    let candidates: Vec<BeatCandidate> = indices
        .iter()
        .map(|&i| BeatCandidate {
            time: onset.times[i],
            strength: salience[i],
            source: CandidateSource::Salience,
        })
        .collect();

    let events: Vec<Event> = candidates.iter().map(Event::from).collect();
    let warnings = density_warnings(&events, &onset.times);
    for w in &warnings {
        log::warn!("{}", w);
    }

    log::debug!(
        "Detected {} beat candidates (threshold={:.3})",
        candidates.len(),
        threshold
    );

    Ok(BeatCandidateResult {
        candidates,
        salience: Some(Signal1D::new(onset.times.clone(), salience)),
        warnings,
    })
}
