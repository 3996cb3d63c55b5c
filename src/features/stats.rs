//! Shared statistics for 1D signals
//!
//! Percentiles, robust spread, z-scores, min-max normalization and the O(n) centered
//! moving average used by the onset envelope, beat salience and the transform chain.

use crate::error::AnalysisError;

/// Numerical stability epsilon
pub const EPSILON: f32 = 1e-10;

/// Percentile of `values` (0.0-1.0) using the sorted-index rule `sorted[floor(n * p)]`
///
/// # Errors
///
/// Returns `AnalysisError` if values are empty or percentile is out of range
pub fn percentile(values: &[f32], percentile: f32) -> Result<f32, AnalysisError> {
    if values.is_empty() {
        return Err(AnalysisError::InvalidInput(
            "Empty values for percentile calculation".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&percentile) {
        return Err(AnalysisError::InvalidInput(format!(
            "Percentile must be in [0.0, 1.0], got {}",
            percentile
        )));
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let idx = ((sorted.len() as f32) * percentile) as usize;
    Ok(sorted[idx.min(sorted.len() - 1)])
}

/// Median of `values`, averaging the middle pair for even lengths. Empty input yields 0.
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

/// Population mean and standard deviation. Empty input yields `(0, 0)`.
pub fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean as f32, var.sqrt() as f32)
}

/// Scale to `[0, 1]`; a flat signal maps to all zeros
pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - min) / range).collect()
}

/// Zero-mean, unit-variance; a flat signal maps to all zeros
pub fn z_score(values: &[f32]) -> Vec<f32> {
    let (mean, std) = mean_std(values);
    if std <= EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - mean) / std).collect()
}

/// Centered moving average with a window of `window` samples (forced odd)
///
/// Uses prefix sums so the cost is O(n) regardless of window length. Windows are truncated
/// at the signal edges and averaged over the samples actually covered.
pub fn moving_average_centered(values: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || values.len() < 2 {
        return values.to_vec();
    }
    let half = window / 2;

    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &v in values {
        acc += v as f64;
        prefix.push(acc);
    }

    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());
            ((prefix[end] - prefix[start]) / (end - start) as f64) as f32
        })
        .collect()
}

/// Spacing between consecutive frame times, falling back to `fallback` for < 2 frames
pub fn frame_period(times: &[f32], fallback: f32) -> f32 {
    if times.len() >= 2 {
        let span = times[times.len() - 1] - times[0];
        if span > 0.0 {
            return span / (times.len() - 1) as f32;
        }
    }
    fallback
}

/// Convert a duration in ms to a whole number of frames (rounded up)
pub fn ms_to_frames(ms: f32, frame_period_sec: f32) -> usize {
    if ms <= 0.0 || frame_period_sec <= 0.0 {
        return 0;
    }
    // Tolerance keeps exact multiples (100 ms at 10 ms frames) from rounding up a frame
    let frames = (ms as f64 / 1000.0) / frame_period_sec as f64;
    (frames - 1e-4).ceil().max(0.0) as usize
}
