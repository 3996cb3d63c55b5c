//! Activity and silence gating
//!
//! Estimates an adaptive noise floor from per-frame energy and runs a two-state hysteresis
//! machine over it:
//!
//! - `INACTIVE → ACTIVE` when `energy >= enter_threshold`
//! - `ACTIVE` stays active (hangover reset) while `energy >= exit_threshold`
//! - below the exit threshold the hangover counter runs down; the machine stays ACTIVE for
//!   exactly `hangover_frames` such frames and goes INACTIVE on the next one
//!
//! Active runs shorter than `min_active_ms` are then removed as blips, and a suppress mask
//! marks the first `suppress_ms` after every `INACTIVE → ACTIVE` transition so onset-style
//! features do not fire on the first loud frame after silence.
//!
//! Onset, flux and centroid extractors consume the resulting [`ActivitySignal`] instead of
//! applying thresholds of their own.

use serde::{Deserialize, Serialize};

use crate::config::ActivityConfig;
use crate::error::AnalysisError;
use crate::features::stats::{frame_period, ms_to_frames, percentile, EPSILON};
use crate::spectrum::stft::Spectrogram;

/// Percentile used to judge whether the signal has any dynamics
const DYNAMICS_PERCENTILE: f32 = 0.95;

/// Fallback frame period when fewer than two frames exist
const DEFAULT_FRAME_PERIOD: f32 = 512.0 / 44100.0;

/// Thresholds and energies behind an [`ActivitySignal`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDiagnostics {
    /// Per-frame energy in dB
    pub frame_energy: Vec<f32>,
    /// Estimated noise floor in dB
    pub noise_floor: f32,
    /// Level required to enter ACTIVE in dB
    pub enter_threshold: f32,
    /// Level required to stay ACTIVE in dB
    pub exit_threshold: f32,
}

/// Per-frame activity mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySignal {
    /// Frame times in seconds
    pub times: Vec<f32>,
    /// Energy above the floor relative to the enter margin, in `[0, 1]`
    pub activity_level: Vec<f32>,
    /// Hysteresis state per frame
    pub is_active: Vec<bool>,
    /// True for the first frames after each INACTIVE→ACTIVE transition
    pub suppress_mask: Vec<bool>,
    /// Energies and thresholds
    pub diagnostics: ActivityDiagnostics,
}

impl ActivitySignal {
    /// Signal that treats every frame as active and unsuppressed (gating disabled)
    pub fn all_active(times: &[f32]) -> Self {
        let n = times.len();
        Self {
            times: times.to_vec(),
            activity_level: vec![1.0; n],
            is_active: vec![true; n],
            suppress_mask: vec![false; n],
            diagnostics: ActivityDiagnostics {
                frame_energy: vec![0.0; n],
                noise_floor: f32::NEG_INFINITY,
                enter_threshold: f32::NEG_INFINITY,
                exit_threshold: f32::NEG_INFINITY,
            },
        }
    }

    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.is_active.len()
    }

    /// True when frame `frame` is inactive or suppressed (out of range counts as gated)
    pub fn is_gated(&self, frame: usize) -> bool {
        match (self.is_active.get(frame), self.suppress_mask.get(frame)) {
            (Some(&active), Some(&suppressed)) => !active || suppressed,
            _ => true,
        }
    }

    /// Fraction of frames that are active
    pub fn active_fraction(&self) -> f32 {
        if self.is_active.is_empty() {
            return 0.0;
        }
        self.is_active.iter().filter(|&&a| a).count() as f32 / self.is_active.len() as f32
    }
}

/// Per-frame energy in dB: `10·log10(eps + Σ (m · 4 / fft_size)²)`
///
/// The `4 / fft_size` factor undoes the Hann window's coherent gain so a full-scale sine
/// sits near 0 dB.
pub fn frame_energy_db(spectrogram: &Spectrogram) -> Vec<f32> {
    let scale = 4.0 / spectrogram.fft_size.max(1) as f32;
    spectrogram
        .magnitudes
        .iter()
        .map(|frame| {
            let energy: f32 = frame.iter().map(|&m| (m * scale) * (m * scale)).sum();
            10.0 * (EPSILON + energy).log10()
        })
        .collect()
}

/// Compute the activity signal of a spectrogram
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if the config is invalid.
pub fn compute_activity(
    spectrogram: &Spectrogram,
    config: &ActivityConfig,
) -> Result<ActivitySignal, AnalysisError> {
    let energy = frame_energy_db(spectrogram);
    compute_activity_from_energy(&spectrogram.times, energy, config)
}

/// Run the hysteresis machine over precomputed frame energies (dB)
///
/// # Arguments
///
/// * `times` - Frame times in seconds (same length as `frame_energy`)
/// * `frame_energy` - Per-frame energy in dB
/// * `config` - Floor, margin and duration parameters
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid config or mismatched lengths.
pub fn compute_activity_from_energy(
    times: &[f32],
    frame_energy: Vec<f32>,
    config: &ActivityConfig,
) -> Result<ActivitySignal, AnalysisError> {
    let counted = vec![true; frame_energy.len()];
    compute_activity_where(times, frame_energy, &counted, config)
}

/// Like [`compute_activity_from_energy`], but the noise floor and the dynamics check only
/// see frames where `counted[t]` is true
///
/// Frames outside `counted` still run through the state machine but are reported inactive.
/// Used for time-varying bands, whose masked spectrogram is all zeros where the band does
/// not apply.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid config or mismatched lengths.
pub fn compute_activity_where(
    times: &[f32],
    frame_energy: Vec<f32>,
    counted: &[bool],
    config: &ActivityConfig,
) -> Result<ActivitySignal, AnalysisError> {
    config.validate()?;
    if times.len() != frame_energy.len() || counted.len() != frame_energy.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "Activity input length mismatch: {} times, {} energies, {} flags",
            times.len(),
            frame_energy.len(),
            counted.len()
        )));
    }

    let n = frame_energy.len();
    let reference: Vec<f32> = frame_energy
        .iter()
        .zip(counted)
        .filter(|(_, c)| **c)
        .map(|(&e, _)| e)
        .collect();
    if reference.is_empty() {
        if n == 0 {
            log::warn!("No frames for activity detection, returning empty signal");
        } else {
            log::debug!("No counted frames among {}, all inactive", n);
        }
        return Ok(ActivitySignal {
            times: times.to_vec(),
            activity_level: vec![0.0; n],
            is_active: vec![false; n],
            suppress_mask: vec![false; n],
            diagnostics: ActivityDiagnostics {
                frame_energy,
                noise_floor: config.absolute_floor_db,
                enter_threshold: config.absolute_floor_db,
                exit_threshold: config.absolute_floor_db,
            },
        });
    }

    // Step 1: adaptive noise floor and hysteresis thresholds
    let noise_floor = percentile(&reference, config.noise_floor_percentile)?;
    let loud = percentile(&reference, DYNAMICS_PERCENTILE)?;
    let (enter_threshold, exit_threshold) = if loud - noise_floor < config.enter_margin_db {
        // No usable dynamics: only the absolute floor separates silence from signal
        (config.absolute_floor_db, config.absolute_floor_db)
    } else {
        (
            (noise_floor + config.enter_margin_db).max(config.absolute_floor_db),
            (noise_floor + config.exit_margin_db).max(config.absolute_floor_db),
        )
    };

    let period = frame_period(times, DEFAULT_FRAME_PERIOD);
    let hangover_frames = ms_to_frames(config.hangover_ms, period);
    let min_active_frames = ms_to_frames(config.min_active_ms, period);
    let suppress_frames = ms_to_frames(config.suppress_ms, period);

    log::debug!(
        "Activity gating: {} frames, floor={:.1} dB, enter={:.1} dB, exit={:.1} dB, hangover={} frames",
        n,
        noise_floor,
        enter_threshold,
        exit_threshold,
        hangover_frames
    );

    // Step 2: hysteresis state machine
    let mut is_active = Vec::with_capacity(n);
    let mut active = false;
    let mut hangover = 0usize;
    for &e in &frame_energy {
        if !active {
            if e >= enter_threshold {
                active = true;
                hangover = hangover_frames;
            }
        } else if e >= exit_threshold {
            hangover = hangover_frames;
        } else if hangover > 0 {
            hangover -= 1;
        } else {
            active = false;
        }
        is_active.push(active);
    }
    for (flag, &c) in is_active.iter_mut().zip(counted) {
        *flag &= c;
    }

    // Step 3: drop blips shorter than the minimum active duration
    if min_active_frames > 1 {
        remove_short_runs(&mut is_active, min_active_frames);
    }

    // Step 4: suppress the first frames after each INACTIVE→ACTIVE transition
    let mut suppress_mask = vec![false; n];
    if suppress_frames > 0 {
        for i in 0..n {
            let rising = is_active[i] && (i == 0 || !is_active[i - 1]);
            if rising {
                for flag in suppress_mask.iter_mut().skip(i).take(suppress_frames) {
                    *flag = true;
                }
            }
        }
    }

    let span = enter_threshold - noise_floor;
    let activity_level = frame_energy
        .iter()
        .zip(counted)
        .map(|(&e, &c)| {
            if !c {
                0.0
            } else if span > EPSILON {
                ((e - noise_floor) / span).clamp(0.0, 1.0)
            } else if e >= enter_threshold {
                1.0
            } else {
                0.0
            }
        })
        .collect();

    let signal = ActivitySignal {
        times: times.to_vec(),
        activity_level,
        is_active,
        suppress_mask,
        diagnostics: ActivityDiagnostics {
            frame_energy,
            noise_floor,
            enter_threshold,
            exit_threshold,
        },
    };

    log::debug!(
        "Activity gating: {:.1}% of frames active",
        signal.active_fraction() * 100.0
    );

    Ok(signal)
}

/// Clear active runs shorter than `min_len` frames
fn remove_short_runs(mask: &mut [bool], min_len: usize) {
    let mut i = 0;
    while i < mask.len() {
        if !mask[i] {
            i += 1;
            continue;
        }
        let start = i;
        while i < mask.len() && mask[i] {
            i += 1;
        }
        if i - start < min_len {
            mask[start..i].iter_mut().for_each(|a| *a = false);
        }
    }
}
