//! Onset strength envelope
//!
//! Algorithm:
//! 1. Optionally log-compress linear magnitudes (`ln(1 + m)`); log-mel input is used as-is
//! 2. Per bin, take the rectified (or absolute) difference to the previous frame
//! 3. Average over valid bins; with `bin_floor_ratio > 0`, bins whose linear level is below
//!    that fraction of the frame maximum in both frames are ignored
//! 4. Zero inactive and suppressed frames (silence gating)
//! 5. Smooth with a centered moving average (prefix sums, O(n))
//!
//! # Example
//!
//! ```
//! use spectral_mir::config::OnsetConfig;
//! use spectral_mir::features::onset::envelope::onset_envelope_frames;
//!
//! let frames = vec![vec![0.0; 4], vec![1.0; 4], vec![1.0; 4]];
//! let cfg = OnsetConfig { smooth_ms: 0.0, ..Default::default() };
//! let env = onset_envelope_frames(&frames, false, &cfg, None, 0.01);
//! assert_eq!(env[0], 0.0);
//! assert!(env[1] > 0.0);
//! assert_eq!(env[2], 0.0);
//! ```

use crate::config::{OnsetConfig, OnsetDifference, OnsetSource};
use crate::error::AnalysisError;
use crate::features::stats::{frame_period, moving_average_centered, ms_to_frames, EPSILON};
use crate::features::Signal1D;
use crate::preprocessing::activity::ActivitySignal;
use crate::spectrum::mel::MelSpectrogram;
use crate::spectrum::stft::Spectrogram;

/// Representation an envelope is computed from
#[derive(Debug, Clone, Copy)]
pub enum OnsetInput<'a> {
    /// Log-mel bands (`log10(eps + x)`)
    Mel(&'a MelSpectrogram),
    /// Linear STFT magnitudes
    Spectrogram(&'a Spectrogram),
}

impl OnsetInput<'_> {
    fn times(&self) -> &[f32] {
        match self {
            OnsetInput::Mel(mel) => &mel.times,
            OnsetInput::Spectrogram(spec) => &spec.times,
        }
    }
}

/// Onset envelope over raw frames
///
/// # Arguments
///
/// * `frames` - `frames[frame][bin]`
/// * `log_domain` - True when `frames` hold `log10` values (mel input)
/// * `config` - Envelope parameters
/// * `activity` - Activity signal for silence gating (ignored when `silence_gate` is off)
/// * `frame_period` - Seconds between frames, used to size the smoothing window
pub fn onset_envelope_frames(
    frames: &[Vec<f32>],
    log_domain: bool,
    config: &OnsetConfig,
    activity: Option<&ActivitySignal>,
    frame_period: f32,
) -> Vec<f32> {
    let n = frames.len();
    let mut envelope = vec![0.0f32; n];
    if n < 2 {
        return envelope;
    }

    let compress = |m: f32| -> f32 {
        if !log_domain && config.log_compress {
            m.max(0.0).ln_1p()
        } else {
            m
        }
    };
    let linear = |v: f32| -> f32 {
        if log_domain {
            10.0f32.powf(v)
        } else {
            v.max(0.0)
        }
    };

    let gate_bins = config.bin_floor_ratio > 0.0;

    for t in 1..n {
        let (prev, cur) = (&frames[t - 1], &frames[t]);
        let floor = if gate_bins {
            let frame_max = cur.iter().map(|&v| linear(v)).fold(0.0f32, f32::max);
            config.bin_floor_ratio * frame_max
        } else {
            0.0
        };

        let mut sum = 0.0f32;
        let mut valid = 0usize;
        for (&p, &c) in prev.iter().zip(cur) {
            if gate_bins && linear(p).max(linear(c)) < floor.max(EPSILON) {
                continue;
            }
            let diff = compress(c) - compress(p);
            sum += match config.difference {
                OnsetDifference::Rectified => diff.max(0.0),
                OnsetDifference::Absolute => diff.abs(),
            };
            valid += 1;
        }
        envelope[t] = if valid > 0 { sum / valid as f32 } else { 0.0 };
    }

    if config.silence_gate {
        if let Some(activity) = activity {
            for (t, value) in envelope.iter_mut().enumerate() {
                if activity.is_gated(t) {
                    *value = 0.0;
                }
            }
        }
    }

    let window = ms_to_frames(config.smooth_ms, frame_period);
    if window > 1 {
        envelope = moving_average_centered(&envelope, window | 1);
    }

    envelope
}

/// Compute the onset envelope from mel or spectrogram input
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for an invalid config or when `input` does not
/// match `config.source`.
pub fn onset_envelope(
    input: OnsetInput<'_>,
    config: &OnsetConfig,
    activity: Option<&ActivitySignal>,
) -> Result<Signal1D, AnalysisError> {
    config.validate()?;
    let (frames, log_domain) = match (input, config.source) {
        (OnsetInput::Mel(mel), OnsetSource::Mel) => (&mel.mel_bands, true),
        (OnsetInput::Spectrogram(spec), OnsetSource::Spectrogram) => (&spec.magnitudes, false),
        (_, source) => {
            return Err(AnalysisError::InvalidInput(format!(
                "Onset input does not match configured source {:?}",
                source
            )))
        }
    };

    let times = input.times();
    if let Some(activity) = activity {
        if activity.num_frames() != times.len() {
            return Err(AnalysisError::InvalidInput(format!(
                "Activity has {} frames, onset input has {}",
                activity.num_frames(),
                times.len()
            )));
        }
    }

    log::debug!(
        "Computing onset envelope: {} frames, source={:?}, difference={:?}, bin_floor={}, gate={}",
        times.len(),
        config.source,
        config.difference,
        config.bin_floor_ratio,
        config.silence_gate && activity.is_some()
    );

    let period = frame_period(times, 0.0);
    let values = onset_envelope_frames(frames, log_domain, config, activity, period);
    Ok(Signal1D::new(times.to_vec(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> OnsetConfig {
        OnsetConfig {
            source: OnsetSource::Spectrogram,
            smooth_ms: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_rectified_ignores_decreases() {
        let frames = vec![vec![1.0, 1.0], vec![0.0, 0.0], vec![1.0, 1.0]];
        let env = onset_envelope_frames(&frames, false, &cfg(), None, 0.01);
        assert_eq!(env[1], 0.0);
        assert!((env[2] - 2.0f32.ln()).abs() < 1e-6);

        let abs_cfg = OnsetConfig {
            difference: OnsetDifference::Absolute,
            ..cfg()
        };
        let env = onset_envelope_frames(&frames, false, &abs_cfg, None, 0.01);
        assert!((env[1] - 2.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_bin_gating_excludes_quiet_bins() {
        // Bin 1 stays near zero; with gating it no longer dilutes the average
        let frames = vec![vec![0.0, 0.0], vec![1.0, 0.001]];
        let plain = OnsetConfig {
            log_compress: false,
            ..cfg()
        };
        let ungated = onset_envelope_frames(&frames, false, &plain, None, 0.01);
        let gated_cfg = OnsetConfig {
            bin_floor_ratio: 0.1,
            ..plain
        };
        let gated = onset_envelope_frames(&frames, false, &gated_cfg, None, 0.01);
        assert!((ungated[1] - 0.5005).abs() < 1e-4);
        assert!((gated[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silence_gate_zeroes_suppressed_frames() {
        let frames = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let times: Vec<f32> = (0..4).map(|i| i as f32 * 0.01).collect();
        let mut activity = ActivitySignal::all_active(&times);
        activity.suppress_mask[1] = true;
        activity.is_active[3] = false;

        let env = onset_envelope_frames(&frames, false, &cfg(), Some(&activity), 0.01);
        assert_eq!(env[1], 0.0);
        assert!(env[2] > 0.0);
        assert_eq!(env[3], 0.0);

        let ungated = OnsetConfig {
            silence_gate: false,
            ..cfg()
        };
        let env = onset_envelope_frames(&frames, false, &ungated, Some(&activity), 0.01);
        assert!(env[1] > 0.0);
    }

    #[test]
    fn test_smoothing_spreads_impulse() {
        let mut frames = vec![vec![0.0]; 10];
        for f in frames.iter_mut().skip(5) {
            f[0] = 1.0;
        }
        let smooth = OnsetConfig {
            smooth_ms: 30.0,
            log_compress: false,
            ..cfg()
        };
        let env = onset_envelope_frames(&frames, false, &smooth, None, 0.01);
        // 3-frame window
        assert!((env[4] - 1.0 / 3.0).abs() < 1e-6);
        assert!((env[5] - 1.0 / 3.0).abs() < 1e-6);
        assert!((env[6] - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(env[8], 0.0);
    }

    #[test]
    fn test_source_mismatch_rejected() {
        let mel = MelSpectrogram {
            times: vec![0.0],
            mel_bands: vec![vec![0.0]],
            band_frequencies: vec![100.0],
        };
        assert!(onset_envelope(OnsetInput::Mel(&mel), &cfg(), None).is_err());
        let mel_cfg = OnsetConfig::default();
        assert!(onset_envelope(OnsetInput::Mel(&mel), &mel_cfg, None).is_ok());
    }
}
