//! Beat-grid phase alignment
//!
//! For a fixed tempo, tries `phase_resolution` evenly spaced offsets across one beat period.
//! Each beat candidate is matched to its nearest grid line; matches within `match_tolerance`
//! contribute `strength · exp(-err² / 2σ²)` with `σ = match_tolerance / 2`. The raw score is
//! then penalized by the mean absolute offset error of the matches.

use serde::{Deserialize, Serialize};

use crate::config::PhaseAlignmentConfig;
use crate::error::AnalysisError;
use crate::events::beat_candidates::BeatCandidate;
use crate::features::stats::EPSILON;

/// One candidate phase offset and how well it fits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseHypothesis {
    /// Offset index in `0..phase_resolution`
    pub index: usize,
    /// Phase offset in seconds, in `[0, period)`
    pub phase_offset: f32,
    /// Score relative to the best offset, in `[0, 1]`
    pub score: f32,
    /// Candidates within tolerance of a grid line
    pub match_count: usize,
    /// Mean absolute distance of matched candidates to their grid lines, in seconds
    pub avg_offset_error: f32,
}

/// Ranked phase hypotheses for one tempo
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseAlignmentResult {
    /// Tempo the grid was aligned for
    pub bpm: f32,
    /// Best offsets first
    pub hypotheses: Vec<PhaseHypothesis>,
    /// Advisory diagnostics
    pub warnings: Vec<String>,
}

/// Raw score, match count and mean error for one offset
fn score_offset(
    candidates: &[BeatCandidate],
    period: f64,
    offset: f64,
    config: &PhaseAlignmentConfig,
) -> (f32, usize, f32) {
    let tolerance = config.match_tolerance as f64;
    let sigma = tolerance / 2.0;
    let mut raw = 0.0f64;
    let mut error_sum = 0.0f64;
    let mut matches = 0usize;

    for c in candidates {
        let t = c.time as f64;
        let k = ((t - offset) / period).round();
        let err = (t - (offset + k * period)).abs();
        if err <= tolerance {
            raw += c.strength.max(0.0) as f64 * (-(err * err) / (2.0 * sigma * sigma)).exp();
            error_sum += err;
            matches += 1;
        }
    }

    if matches == 0 {
        return (0.0, 0, 0.0);
    }
    let avg = error_sum / matches as f64;
    let penalty = (1.0 - config.error_penalty as f64 * avg / tolerance).max(0.0);
    ((raw * penalty) as f32, matches, avg as f32)
}

/// Find the best grid phase offsets for `bpm`
///
/// # Arguments
///
/// * `candidates` - Beat candidates (any order)
/// * `bpm` - Tempo to align
/// * `config` - Resolution, tolerance, penalty and number of results
///
/// # Returns
///
/// Up to `top_k` hypotheses ordered by descending score, ties broken by the smaller offset.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if `bpm` is not a positive finite number or the
/// config is invalid.
pub fn align_phase(
    candidates: &[BeatCandidate],
    bpm: f32,
    config: &PhaseAlignmentConfig,
) -> Result<PhaseAlignmentResult, AnalysisError> {
    config.validate()?;
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "BPM must be a positive finite number, got {}",
            bpm
        )));
    }

    log::debug!(
        "Aligning phase: {} candidates at {:.2} BPM, resolution {}",
        candidates.len(),
        bpm,
        config.phase_resolution
    );

    if candidates.is_empty() {
        log::warn!("No beat candidates for phase alignment");
        return Ok(PhaseAlignmentResult {
            bpm,
            hypotheses: Vec::new(),
            warnings: vec!["No beat candidates available for phase alignment".to_string()],
        });
    }

    let period = 60.0 / bpm as f64;
    let mut hypotheses: Vec<PhaseHypothesis> = (0..config.phase_resolution)
        .map(|j| {
            let offset = j as f64 * period / config.phase_resolution as f64;
            let (score, match_count, avg_offset_error) =
                score_offset(candidates, period, offset, config);
            PhaseHypothesis {
                index: j,
                phase_offset: offset as f32,
                score,
                match_count,
                avg_offset_error,
            }
        })
        .collect();

    let best = hypotheses.iter().map(|h| h.score).fold(0.0f32, f32::max);
    let mut warnings = Vec::new();
    if best > EPSILON {
        for h in &mut hypotheses {
            h.score /= best;
        }
    } else {
        let msg = format!("No candidate lies within {:.3}s of any grid line", config.match_tolerance);
        log::warn!("{}", msg);
        warnings.push(msg);
    }

    hypotheses.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.phase_offset.total_cmp(&b.phase_offset))
    });
    hypotheses.truncate(config.top_k);

    if let Some(top) = hypotheses.first() {
        log::debug!(
            "Best phase offset {:.4}s ({} matches, avg error {:.4}s)",
            top.phase_offset,
            top.match_count,
            top.avg_offset_error
        );
    }

    Ok(PhaseAlignmentResult {
        bpm,
        hypotheses,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::beat_candidates::CandidateSource;

    fn grid(phase: f32, period: f32, count: usize) -> Vec<BeatCandidate> {
        (0..count)
            .map(|k| BeatCandidate {
                time: phase + k as f32 * period,
                strength: 1.0,
                source: CandidateSource::Salience,
            })
            .collect()
    }

    #[test]
    fn test_recovers_phase() {
        let candidates = grid(0.13, 0.5, 16);
        let result = align_phase(&candidates, 120.0, &PhaseAlignmentConfig::default()).unwrap();
        let best = &result.hypotheses[0];
        // Resolution 32 at 0.5 s: nearest offset is 8 * 0.015625 = 0.125
        assert_eq!(best.index, 8);
        assert!((best.phase_offset - 0.125).abs() < 1e-6);
        assert_eq!(best.score, 1.0);
        assert_eq!(best.match_count, 16);
        assert!((best.avg_offset_error - 0.005).abs() < 1e-4);
    }

    #[test]
    fn test_ranking_order_and_top_k() {
        let candidates = grid(0.2, 0.5, 10);
        let cfg = PhaseAlignmentConfig {
            top_k: 5,
            ..Default::default()
        };
        let result = align_phase(&candidates, 120.0, &cfg).unwrap();
        assert_eq!(result.hypotheses.len(), 5);
        for pair in result.hypotheses.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert!(result
            .hypotheses
            .iter()
            .all(|h| (0.0..0.5).contains(&h.phase_offset) && (0.0..=1.0).contains(&h.score)));
    }

    #[test]
    fn test_error_penalty_prefers_tighter_fit() {
        // Candidates alternate 0.01 s early / late around phase 0.25
        let candidates: Vec<BeatCandidate> = (0..12)
            .map(|k| BeatCandidate {
                time: 0.25 + k as f32 * 0.5 + if k % 2 == 0 { 0.01 } else { -0.01 },
                strength: 1.0,
                source: CandidateSource::Salience,
            })
            .collect();
        let result = align_phase(&candidates, 120.0, &PhaseAlignmentConfig::default()).unwrap();
        assert!((result.hypotheses[0].phase_offset - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_bpm() {
        let candidates = grid(0.0, 0.5, 4);
        let cfg = PhaseAlignmentConfig::default();
        assert!(align_phase(&candidates, 0.0, &cfg).is_err());
        assert!(align_phase(&candidates, f32::NAN, &cfg).is_err());
        assert!(align_phase(&candidates, -120.0, &cfg).is_err());
    }

    #[test]
    fn test_empty_candidates_warn() {
        let result = align_phase(&[], 120.0, &PhaseAlignmentConfig::default()).unwrap();
        assert!(result.hypotheses.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }
}
