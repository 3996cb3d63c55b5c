//! Adaptive peak picking
//!
//! Turns a 1D signal into a discrete event stream:
//!
//! 1. Threshold = `mean + adaptive_factor · std` over the whole signal
//! 2. Keep strict local maxima at or above the threshold (edge samples compare against
//!    their single neighbour)
//! 3. Walk the peaks in time order; a peak closer than `min_interval_sec` to the last kept
//!    one replaces it if stronger and is dropped otherwise
//!
//! # Example
//!
//! ```
//! use spectral_mir::config::PeakPickConfig;
//! use spectral_mir::events::peak_picking::pick_peaks;
//! use spectral_mir::features::Signal1D;
//!
//! let times: Vec<f32> = (0..10).map(|i| i as f32 * 0.1).collect();
//! let values = vec![0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0];
//! let stream = pick_peaks(&Signal1D::new(times, values), &PeakPickConfig::default())?;
//! assert_eq!(stream.events.len(), 2);
//! assert!((stream.events[1].weight - 1.0).abs() < 1e-6);
//! # Ok::<(), spectral_mir::AnalysisError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::config::PeakPickConfig;
use crate::error::AnalysisError;
use crate::features::stats::{mean_std, EPSILON};
use crate::features::Signal1D;

/// Density above which an event stream is flagged (events per second)
pub const HIGH_DENSITY_PER_SEC: f32 = 8.0;

/// Density below which a long event stream is flagged (events per second)
pub const LOW_DENSITY_PER_SEC: f32 = 0.1;

/// Minimum duration before low density is flagged, in seconds
const LOW_DENSITY_MIN_DURATION: f32 = 10.0;

/// A discrete event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event time in seconds
    pub time: f32,
    /// Peak value relative to the strongest event, in `[0, 1]`
    pub weight: f32,
}

/// Events picked from one signal, ordered by time
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventStream {
    /// Events in time order
    pub events: Vec<Event>,
    /// Absolute threshold that was applied
    pub threshold: f32,
    /// Advisory diagnostics (empty stream, unusual density)
    pub warnings: Vec<String>,
}

impl EventStream {
    /// Event times
    pub fn times(&self) -> Vec<f32> {
        self.events.iter().map(|e| e.time).collect()
    }
}

/// Indices of accepted peaks, in time order
///
/// # Arguments
///
/// * `values` - Signal values
/// * `times` - Time of each value in seconds
/// * `threshold` - Absolute minimum peak height
/// * `min_interval_sec` - Minimum time between accepted peaks
pub fn find_peak_indices(
    values: &[f32],
    times: &[f32],
    threshold: f32,
    min_interval_sec: f32,
) -> Vec<usize> {
    let n = values.len().min(times.len());
    if n < 2 {
        return Vec::new();
    }

    let mut kept: Vec<usize> = Vec::new();
    for i in 0..n {
        let v = values[i];
        if v < threshold {
            continue;
        }
        let left_ok = i == 0 || v > values[i - 1];
        let right_ok = i == n - 1 || v > values[i + 1];
        if !(left_ok && right_ok) {
            continue;
        }

        match kept.last().copied() {
            Some(last) if times[i] - times[last] < min_interval_sec => {
                if v > values[last] {
                    if let Some(slot) = kept.last_mut() {
                        *slot = i;
                    }
                }
            }
            _ => kept.push(i),
        }
    }
    kept
}

/// Pick peaks from a signal with an adaptive threshold
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid config or when `times` and `values`
/// differ in length.
pub fn pick_peaks(
    signal: &Signal1D,
    config: &PeakPickConfig,
) -> Result<EventStream, AnalysisError> {
    config.validate()?;
    if signal.times.len() != signal.values.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "Signal has {} times but {} values",
            signal.times.len(),
            signal.values.len()
        )));
    }

    let (mean, std) = mean_std(&signal.values);
    let threshold = mean + config.adaptive_factor * std;

    log::debug!(
        "Peak picking: {} samples, mean={:.4}, std={:.4}, threshold={:.4}, min_interval={:.3}s",
        signal.len(),
        mean,
        std,
        threshold,
        config.min_interval_sec
    );

    let indices = find_peak_indices(
        &signal.values,
        &signal.times,
        threshold,
        config.min_interval_sec,
    );

    let max_peak = indices
        .iter()
        .map(|&i| signal.values[i])
        .fold(f32::NEG_INFINITY, f32::max);
    let events: Vec<Event> = indices
        .iter()
        .map(|&i| Event {
            time: signal.times[i],
            weight: if max_peak > EPSILON {
                (signal.values[i] / max_peak).clamp(0.0, 1.0)
            } else {
                1.0
            },
        })
        .collect();

    let warnings = density_warnings(&events, &signal.times);
    for w in &warnings {
        log::warn!("{}", w);
    }

    Ok(EventStream {
        events,
        threshold,
        warnings,
    })
}

/// Advisory warnings for empty or implausibly dense/sparse streams
pub fn density_warnings(events: &[Event], times: &[f32]) -> Vec<String> {
    let mut warnings = Vec::new();
    if events.is_empty() {
        warnings.push("No events detected above the adaptive threshold".to_string());
        return warnings;
    }

    let duration = match (times.first(), times.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };
    if duration <= 0.0 {
        return warnings;
    }

    let density = events.len() as f32 / duration;
    if density > HIGH_DENSITY_PER_SEC {
        warnings.push(format!(
            "High event density: {:.1} events/s (> {:.0})",
            density, HIGH_DENSITY_PER_SEC
        ));
    } else if density < LOW_DENSITY_PER_SEC && duration >= LOW_DENSITY_MIN_DURATION {
        warnings.push(format!(
            "Low event density: {:.2} events/s over {:.1}s",
            density, duration
        ));
    }
    warnings
}
