//! Tempo hypotheses from inter-onset intervals
//!
//! Deterministic histogram method:
//!
//! 1. Inter-onset intervals between adjacent candidates, converted to BPM; intervals outside
//!    `[min_bpm, max_bpm]` are skipped. Each interval is optionally weighted by the geometric
//!    mean of its two candidates' strengths
//! 2. Bucket into a histogram at `bin_size_bpm` resolution
//! 3. Local-maximum bins above `min_confidence · max_height` become peaks
//! 4. Each peak's BPM is refined with a 3-bin weighted centroid
//! 5. Peaks are grouped into harmonic families (ratios `1/2, 1/3, 2/3, 1, 3/2, 2, 3`
//!    within `family_tolerance`); the first-seen member of a family is its root
//! 6. Confidence = peak height / highest peak; sort descending, truncate, assign `hyp-{rank}`
//!
//! No randomness is involved: identical candidate lists always yield identical hypotheses.

use serde::{Deserialize, Serialize};

use crate::config::TempoHypothesisConfig;
use crate::error::AnalysisError;
use crate::events::beat_candidates::BeatCandidate;
use crate::features::stats::EPSILON;

/// Ratios (hypothesis BPM / family root BPM) that join a family
pub const HARMONIC_RATIOS: [f32; 7] = [0.5, 1.0 / 3.0, 2.0 / 3.0, 1.0, 1.5, 2.0, 3.0];

/// Histogram support behind a hypothesis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoEvidence {
    /// Intervals that fell into the peak's 3-bin neighbourhood
    pub supporting_interval_count: usize,
    /// Summed (possibly strength-weighted) histogram mass of those bins
    pub weighted_support: f32,
    /// Height of the peak bin
    pub peak_height: f32,
    /// BPM range `[low, high)` covered by the neighbourhood
    pub bin_range: (f32, f32),
}

/// A candidate tempo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoHypothesis {
    /// `hyp-{rank}`, rank 0 is the most confident
    pub id: String,
    /// Refined tempo in BPM
    pub bpm: f32,
    /// Peak height relative to the highest peak, in `[0, 1]`
    pub confidence: f32,
    /// Histogram support
    pub evidence: TempoEvidence,
    /// `fam-{n}`, shared by harmonically related hypotheses
    pub family_id: String,
    /// BPM ratio to the family root (1.0 for the root)
    pub harmonic_ratio: f32,
}

/// Inter-onset-interval histogram
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TempoHistogram {
    /// Center BPM of each bin
    pub bin_centers: Vec<f32>,
    /// Histogram mass per bin
    pub heights: Vec<f32>,
    /// Raw interval count per bin
    pub counts: Vec<usize>,
}

/// Ranked hypotheses plus the histogram they came from
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TempoHypothesisResult {
    /// Hypotheses by descending confidence
    pub hypotheses: Vec<TempoHypothesis>,
    /// Interval histogram
    pub histogram: TempoHistogram,
    /// Number of intervals that landed in range
    pub interval_count: usize,
    /// Advisory diagnostics
    pub warnings: Vec<String>,
}

impl TempoHypothesisResult {
    /// Most confident hypothesis
    pub fn best(&self) -> Option<&TempoHypothesis> {
        self.hypotheses.first()
    }
}

/// Build the interval histogram
pub fn build_histogram(
    candidates: &[BeatCandidate],
    config: &TempoHypothesisConfig,
) -> (TempoHistogram, usize) {
    let n_bins = (((config.max_bpm - config.min_bpm) / config.bin_size_bpm).ceil() as usize).max(1);
    let mut heights = vec![0.0f32; n_bins];
    let mut counts = vec![0usize; n_bins];
    let mut interval_count = 0usize;

    for pair in candidates.windows(2) {
        let ioi = pair[1].time - pair[0].time;
        if ioi <= EPSILON {
            continue;
        }
        let bpm = 60.0 / ioi;
        if bpm < config.min_bpm || bpm > config.max_bpm {
            continue;
        }
        let idx = (((bpm - config.min_bpm) / config.bin_size_bpm).floor() as usize).min(n_bins - 1);
        let weight = if config.weight_by_strength {
            (pair[0].strength.max(0.0) * pair[1].strength.max(0.0)).sqrt()
        } else {
            1.0
        };
        heights[idx] += weight;
        counts[idx] += 1;
        interval_count += 1;
    }

    let bin_centers = (0..n_bins)
        .map(|i| config.min_bpm + (i as f32 + 0.5) * config.bin_size_bpm)
        .collect();

    (
        TempoHistogram {
            bin_centers,
            heights,
            counts,
        },
        interval_count,
    )
}

/// Family id and ratio for `bpm` given the roots seen so far
fn assign_family(bpm: f32, roots: &mut Vec<f32>, tolerance: f32) -> (String, f32) {
    for (family, &root) in roots.iter().enumerate() {
        let ratio = bpm / root;
        for &r in &HARMONIC_RATIOS {
            if ((ratio - r) / r).abs() <= tolerance {
                return (format!("fam-{}", family), r);
            }
        }
    }
    roots.push(bpm);
    (format!("fam-{}", roots.len() - 1), 1.0)
}

/// Generate ranked tempo hypotheses from beat candidates
///
/// Candidates must be ordered by time (as produced by beat-candidate detection).
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if the config is invalid. Degenerate inputs (fewer
/// than two candidates, no in-range intervals) return an empty result with a warning.
pub fn generate_tempo_hypotheses(
    candidates: &[BeatCandidate],
    config: &TempoHypothesisConfig,
) -> Result<TempoHypothesisResult, AnalysisError> {
    config.validate()?;

    log::debug!(
        "Generating tempo hypotheses: {} candidates, range {:.0}-{:.0} BPM, bin={} BPM",
        candidates.len(),
        config.min_bpm,
        config.max_bpm,
        config.bin_size_bpm
    );

    let mut warnings = Vec::new();
    if candidates.len() < 2 {
        let msg = format!(
            "Need at least 2 beat candidates for tempo inference, got {}",
            candidates.len()
        );
        log::warn!("{}", msg);
        warnings.push(msg);
        return Ok(TempoHypothesisResult {
            warnings,
            ..Default::default()
        });
    }

    let (histogram, interval_count) = build_histogram(candidates, config);
    if interval_count == 0 {
        let msg = format!(
            "No inter-onset intervals within {:.0}-{:.0} BPM",
            config.min_bpm, config.max_bpm
        );
        log::warn!("{}", msg);
        warnings.push(msg);
        return Ok(TempoHypothesisResult {
            histogram,
            interval_count,
            warnings,
            ..Default::default()
        });
    }

    let h = &histogram.heights;
    let n = h.len();
    let max_height = h.iter().copied().fold(0.0f32, f32::max);
    if max_height <= EPSILON {
        // Only zero-strength candidates contributed
        let msg = "All inter-onset intervals have zero weight".to_string();
        log::warn!("{}", msg);
        warnings.push(msg);
        return Ok(TempoHypothesisResult {
            histogram,
            interval_count,
            warnings,
            ..Default::default()
        });
    }
    let floor = config.min_confidence * max_height;

    // Peaks in histogram (ascending BPM) order
    let mut roots: Vec<f32> = Vec::new();
    let mut hypotheses = Vec::new();
    for i in 0..n {
        let left = if i > 0 { h[i - 1] } else { 0.0 };
        let right = if i + 1 < n { h[i + 1] } else { 0.0 };
        if h[i] <= EPSILON || h[i] < floor || !(h[i] > left && h[i] >= right) {
            continue;
        }

        let lo = i.saturating_sub(1);
        let hi = (i + 1).min(n - 1);
        let (weighted, mass, count) = (lo..=hi).fold((0.0f32, 0.0f32, 0usize), |(w, m, c), j| {
            (
                w + histogram.bin_centers[j] * h[j],
                m + h[j],
                c + histogram.counts[j],
            )
        });
        let bpm = if mass > EPSILON {
            weighted / mass
        } else {
            histogram.bin_centers[i]
        };

        let (family_id, harmonic_ratio) = assign_family(bpm, &mut roots, config.family_tolerance);
        hypotheses.push(TempoHypothesis {
            id: String::new(),
            bpm,
            confidence: h[i] / max_height,
            evidence: TempoEvidence {
                supporting_interval_count: count,
                weighted_support: mass,
                peak_height: h[i],
                bin_range: (
                    config.min_bpm + lo as f32 * config.bin_size_bpm,
                    config.min_bpm + (hi + 1) as f32 * config.bin_size_bpm,
                ),
            },
            family_id,
            harmonic_ratio,
        });
    }

    hypotheses.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then(a.bpm.total_cmp(&b.bpm))
    });
    hypotheses.truncate(config.max_hypotheses);
    for (rank, hyp) in hypotheses.iter_mut().enumerate() {
        hyp.id = format!("hyp-{}", rank);
    }

    if let Some(best) = hypotheses.first() {
        log::debug!(
            "{} tempo hypotheses from {} intervals, best {:.2} BPM ({})",
            hypotheses.len(),
            interval_count,
            best.bpm,
            best.family_id
        );
    }

    Ok(TempoHypothesisResult {
        hypotheses,
        histogram,
        interval_count,
        warnings,
    })
}
