//! Beat grid
//!
//! A grid is `bpm` + `phase_offset` + `user_nudge`. Beat times are
//! `phase_offset + user_nudge + k · 60 / bpm` for every integer `k` that lands in
//! `[0, duration]`. A locked grid ignores nudges.

use serde::{Deserialize, Serialize};

use super::phase::PhaseHypothesis;
use crate::error::AnalysisError;

/// Slack for floating-point boundary comparisons, in seconds
const BOUNDARY_EPSILON: f64 = 1e-9;

/// Beat grid parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    /// Tempo in BPM
    pub bpm: f32,
    /// Offset of the first grid line, in seconds
    pub phase_offset: f32,
    /// Manual adjustment added to the phase, in seconds
    pub user_nudge: f32,
    /// Locked grids reject nudges
    pub is_locked: bool,
}

impl BeatGrid {
    /// Create an unlocked grid without nudge
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` if `bpm` is not positive and finite.
    pub fn new(bpm: f32, phase_offset: f32) -> Result<Self, AnalysisError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(AnalysisError::InvalidInput(format!(
                "BPM must be a positive finite number, got {}",
                bpm
            )));
        }
        Ok(Self {
            bpm,
            phase_offset,
            user_nudge: 0.0,
            is_locked: false,
        })
    }

    /// Grid from a phase-alignment result
    pub fn from_phase(bpm: f32, phase: &PhaseHypothesis) -> Result<Self, AnalysisError> {
        Self::new(bpm, phase.phase_offset)
    }

    /// Beat period in seconds
    pub fn period(&self) -> f32 {
        60.0 / self.bpm
    }

    /// Shift the grid by `delta` seconds
    ///
    /// Returns `false` (and leaves the grid untouched) when locked.
    pub fn nudge(&mut self, delta: f32) -> bool {
        if self.is_locked {
            log::debug!("Ignoring nudge of {:.4}s on locked grid", delta);
            return false;
        }
        self.user_nudge += delta;
        true
    }

    /// Lock the grid
    pub fn lock(&mut self) {
        self.is_locked = true;
    }

    /// Unlock the grid
    pub fn unlock(&mut self) {
        self.is_locked = false;
    }

    /// Beat times within `[0, duration]`
    pub fn beat_times(&self, duration: f32) -> Vec<f32> {
        generate_beat_times(self.bpm, self.phase_offset, self.user_nudge, duration)
    }
}

/// Beat times for a grid within `[0, duration]`, ascending
///
/// Returns an empty list for a non-positive or non-finite BPM or a negative duration.
pub fn generate_beat_times(bpm: f32, phase_offset: f32, user_nudge: f32, duration: f32) -> Vec<f32> {
    if !bpm.is_finite() || bpm <= 0.0 || !duration.is_finite() || duration < 0.0 {
        return Vec::new();
    }

    let period = 60.0 / bpm as f64;
    let start = phase_offset as f64 + user_nudge as f64;
    let duration = duration as f64;

    // First k with start + k·period >= 0
    let k0 = (-start / period - BOUNDARY_EPSILON).ceil() as i64;
    let mut times = Vec::new();
    let mut k = k0;
    loop {
        let t = start + k as f64 * period;
        if t > duration + BOUNDARY_EPSILON {
            break;
        }
        if t >= -BOUNDARY_EPSILON {
            times.push(t.max(0.0) as f32);
        }
        k += 1;
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_120_bpm_four_seconds() {
        let times = generate_beat_times(120.0, 0.0, 0.0, 4.0);
        let expected: Vec<f32> = (0..=8).map(|k| k as f32 * 0.5).collect();
        assert_eq!(times, expected);
    }

    #[test]
    fn test_offset_and_nudge() {
        let times = generate_beat_times(120.0, 0.1, 0.05, 1.2);
        assert_eq!(times.len(), 3);
        assert!((times[0] - 0.15).abs() < 1e-6);
        assert!((times[2] - 1.15).abs() < 1e-6);
    }

    #[test]
    fn test_negative_start_wraps_forward() {
        // Nudged before zero: first beat is one period later
        let times = generate_beat_times(120.0, 0.1, -0.3, 1.0);
        assert!((times[0] - 0.3).abs() < 1e-6);
        assert!((times[1] - 0.8).abs() < 1e-6);
        assert_eq!(times.len(), 2);
    }

    #[test]
    fn test_invalid_inputs_yield_nothing() {
        assert!(generate_beat_times(0.0, 0.0, 0.0, 4.0).is_empty());
        assert!(generate_beat_times(-60.0, 0.0, 0.0, 4.0).is_empty());
        assert!(generate_beat_times(120.0, 0.0, 0.0, -1.0).is_empty());
        assert!(BeatGrid::new(0.0, 0.0).is_err());
    }

    #[test]
    fn test_lock_blocks_nudge() {
        let mut grid = BeatGrid::new(100.0, 0.0).unwrap();
        assert!(grid.nudge(0.02));
        grid.lock();
        assert!(!grid.nudge(0.5));
        assert!((grid.user_nudge - 0.02).abs() < 1e-7);
        grid.unlock();
        assert!(grid.nudge(-0.02));
        assert!(grid.user_nudge.abs() < 1e-7);
        assert!((grid.period() - 0.6).abs() < 1e-6);
    }
}
