//! 1D transform chain
//!
//! Steps are applied left to right; each produces a new signal on the same time axis.
//!
//! # Example
//!
//! ```
//! use spectral_mir::derived::transform::{apply_transform_chain, TransformStep};
//! use spectral_mir::features::Signal1D;
//!
//! let signal = Signal1D::new(vec![0.0, 0.1, 0.2, 0.3], vec![5.0; 4]);
//! let steps = [
//!     TransformStep::Scale { factor: 2.0, offset: 1.0 },
//!     TransformStep::Clamp { min: 0.0, max: 10.0 },
//! ];
//! let out = apply_transform_chain(&signal, &steps)?;
//! assert_eq!(out.values, vec![10.0; 4]);
//! # Ok::<(), spectral_mir::AnalysisError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::features::stats::{
    min_max_normalize, moving_average_centered, percentile, z_score, EPSILON,
};
use crate::features::Signal1D;

/// Smoothing kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothMethod {
    /// Centered box filter
    MovingAverage,
    /// One-pole low-pass, causal
    Exponential,
    /// Centered Gaussian, truncated at 3σ
    Gaussian,
}

/// Normalization method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    /// Map `[min, max]` onto `[0, 1]`
    MinMax,
    /// Map `[p5, p95]` onto `[0, 1]` (values outside the percentiles are not clamped)
    Robust,
    /// Zero mean, unit variance
    ZScore,
}

/// Sign handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolarityMode {
    /// Keep signs
    Signed,
    /// Absolute value
    Magnitude,
}

/// Easing curve for `remap`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    /// `u`
    #[default]
    Linear,
    /// `u²`
    EaseIn,
    /// `1 - (1 - u)²`
    EaseOut,
    /// Quadratic in, then quadratic out
    EaseInOut,
}

impl Ease {
    /// Apply the curve to `u` in `[0, 1]`
    pub fn apply(self, u: f32) -> f32 {
        match self {
            Ease::Linear => u,
            Ease::EaseIn => u * u,
            Ease::EaseOut => 1.0 - (1.0 - u) * (1.0 - u),
            Ease::EaseInOut => {
                if u < 0.5 {
                    2.0 * u * u
                } else {
                    let v = -2.0 * u + 2.0;
                    1.0 - v * v / 2.0
                }
            }
        }
    }
}

/// One step of a transform chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformStep {
    /// Smooth over `window_sec` (σ for Gaussian, time constant for exponential)
    Smooth {
        /// Kernel
        method: SmoothMethod,
        /// Window in seconds; `<= 0` is a no-op
        window_sec: f32,
    },
    /// Normalize the whole signal
    Normalize {
        /// Method
        method: NormalizeMethod,
    },
    /// `v · factor + offset`
    Scale {
        /// Multiplier
        factor: f32,
        /// Added after scaling
        #[serde(default)]
        offset: f32,
    },
    /// Sign handling
    Polarity {
        /// Mode
        mode: PolarityMode,
    },
    /// Clamp into `[min, max]`
    Clamp {
        /// Lower bound
        min: f32,
        /// Upper bound
        max: f32,
    },
    /// Map `[in_min, in_max]` onto `[out_min, out_max]` through an easing curve; inputs
    /// outside the range are clamped first
    Remap {
        /// Input range start
        in_min: f32,
        /// Input range end
        in_max: f32,
        /// Output range start
        out_min: f32,
        /// Output range end
        out_max: f32,
        /// Easing curve
        #[serde(default)]
        ease: Ease,
    },
}

fn smooth(signal: &Signal1D, method: SmoothMethod, window_sec: f32) -> Vec<f32> {
    let rate = signal.frame_rate();
    if window_sec <= 0.0 || rate <= 0.0 || signal.len() < 2 {
        return signal.values.clone();
    }

    match method {
        SmoothMethod::MovingAverage => {
            let window = (window_sec * rate).round() as usize;
            moving_average_centered(&signal.values, window | 1)
        }
        SmoothMethod::Exponential => {
            let alpha = 1.0 - (-1.0 / (window_sec * rate)).exp();
            let mut state = signal.values[0];
            signal
                .values
                .iter()
                .map(|&v| {
                    state += alpha * (v - state);
                    state
                })
                .collect()
        }
        SmoothMethod::Gaussian => {
            let sigma = window_sec * rate;
            let radius = (3.0 * sigma).ceil() as isize;
            let kernel: Vec<f32> = (-radius..=radius)
                .map(|k| (-(k * k) as f32 / (2.0 * sigma * sigma)).exp())
                .collect();
            let n = signal.len() as isize;
            (0..n)
                .map(|i| {
                    // Renormalize over the taps that fall inside the signal
                    let (mut acc, mut weight) = (0.0f32, 0.0f32);
                    for (j, &w) in kernel.iter().enumerate() {
                        let idx = i + j as isize - radius;
                        if (0..n).contains(&idx) {
                            acc += w * signal.values[idx as usize];
                            weight += w;
                        }
                    }
                    if weight > EPSILON {
                        acc / weight
                    } else {
                        signal.values[i as usize]
                    }
                })
                .collect()
        }
    }
}

fn robust_normalize(values: &[f32]) -> Result<Vec<f32>, AnalysisError> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    let p5 = percentile(values, 0.05)?;
    let p95 = percentile(values, 0.95)?;
    let span = p95 - p5;
    if span <= EPSILON {
        return Ok(vec![0.0; values.len()]);
    }
    Ok(values.iter().map(|&v| (v - p5) / span).collect())
}

/// Apply one transform step
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for `Clamp` with `min > max`, `Remap` with an
/// empty input range, or non-finite parameters.
pub fn apply_transform(signal: &Signal1D, step: &TransformStep) -> Result<Signal1D, AnalysisError> {
    let values = match *step {
        TransformStep::Smooth { method, window_sec } => {
            if !window_sec.is_finite() {
                return Err(AnalysisError::InvalidInput(
                    "Smoothing window must be finite".to_string(),
                ));
            }
            smooth(signal, method, window_sec)
        }
        TransformStep::Normalize { method } => match method {
            NormalizeMethod::MinMax => min_max_normalize(&signal.values),
            NormalizeMethod::ZScore => z_score(&signal.values),
            NormalizeMethod::Robust => robust_normalize(&signal.values)?,
        },
        TransformStep::Scale { factor, offset } => {
            signal.values.iter().map(|&v| v * factor + offset).collect()
        }
        TransformStep::Polarity { mode } => match mode {
            PolarityMode::Signed => signal.values.clone(),
            PolarityMode::Magnitude => signal.values.iter().map(|v| v.abs()).collect(),
        },
        TransformStep::Clamp { min, max } => {
            if min.is_nan() || max.is_nan() || min > max {
                return Err(AnalysisError::InvalidInput(format!(
                    "Clamp requires min <= max (got {}..{})",
                    min, max
                )));
            }
            signal.values.iter().map(|&v| v.clamp(min, max)).collect()
        }
        TransformStep::Remap {
            in_min,
            in_max,
            out_min,
            out_max,
            ease,
        } => {
            let span = in_max - in_min;
            if !span.is_finite() || span.abs() <= EPSILON {
                return Err(AnalysisError::InvalidInput(format!(
                    "Remap input range is empty ({}..{})",
                    in_min, in_max
                )));
            }
            signal
                .values
                .iter()
                .map(|&v| {
                    let u = ((v - in_min) / span).clamp(0.0, 1.0);
                    out_min + ease.apply(u) * (out_max - out_min)
                })
                .collect()
        }
    };
    Ok(signal.with_values(values))
}

/// Apply steps left to right
pub fn apply_transform_chain(
    signal: &Signal1D,
    steps: &[TransformStep],
) -> Result<Signal1D, AnalysisError> {
    log::debug!("Applying {} transform steps to {} samples", steps.len(), signal.len());
    steps
        .iter()
        .try_fold(signal.clone(), |acc, step| apply_transform(&acc, step))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::stats::mean_std;

    fn signal(values: Vec<f32>) -> Signal1D {
        let times = (0..values.len()).map(|i| i as f32 * 0.01).collect();
        Signal1D::new(times, values)
    }

    #[test]
    fn test_scale_then_clamp() {
        let s = signal(vec![5.0, 5.0, 5.0, 5.0]);
        let steps = vec![
            TransformStep::Scale {
                factor: 2.0,
                offset: 1.0,
            },
            TransformStep::Clamp { min: 0.0, max: 10.0 },
        ];
        assert_eq!(apply_transform_chain(&s, &steps).unwrap().values, vec![10.0; 4]);
    }

    #[test]
    fn test_invalid_steps() {
        let s = signal(vec![1.0, 2.0]);
        assert!(apply_transform(&s, &TransformStep::Clamp { min: 1.0, max: 0.0 }).is_err());
        let remap = TransformStep::Remap {
            in_min: 1.0,
            in_max: 1.0,
            out_min: 0.0,
            out_max: 1.0,
            ease: Ease::Linear,
        };
        assert!(apply_transform(&s, &remap).is_err());
    }

    #[test]
    fn test_remap_with_ease() {
        let s = signal(vec![-1.0, 0.0, 5.0, 10.0, 20.0]);
        let step = TransformStep::Remap {
            in_min: 0.0,
            in_max: 10.0,
            out_min: 100.0,
            out_max: 200.0,
            ease: Ease::EaseIn,
        };
        let out = apply_transform(&s, &step).unwrap().values;
        assert_eq!(out, vec![100.0, 100.0, 125.0, 200.0, 200.0]);
        assert!((Ease::EaseInOut.apply(0.5) - 0.5).abs() < 1e-6);
        assert!((Ease::EaseOut.apply(0.5) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_methods() {
        let s = signal((0..=100).map(|i| i as f32).collect());
        let robust = apply_transform(&s, &TransformStep::Normalize { method: NormalizeMethod::Robust })
            .unwrap()
            .values;
        // p5 = 5, p95 = 95
        assert!((robust[5]).abs() < 1e-6);
        assert!((robust[95] - 1.0).abs() < 1e-6);
        assert!(robust[100] > 1.0, "robust normalize does not clamp");

        let z = apply_transform(&s, &TransformStep::Normalize { method: NormalizeMethod::ZScore }).unwrap();
        let (mean, std) = mean_std(&z.values);
        assert!(mean.abs() < 1e-4 && (std - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_smoothing_preserves_constant_and_spreads_impulse() {
        let constant = signal(vec![3.0; 50]);
        for method in [SmoothMethod::MovingAverage, SmoothMethod::Exponential, SmoothMethod::Gaussian] {
            let out = apply_transform(&constant, &TransformStep::Smooth { method, window_sec: 0.05 }).unwrap();
            assert!(out.values.iter().all(|v| (v - 3.0).abs() < 1e-5), "{:?}", method);
        }

        let mut impulse = vec![0.0; 51];
        impulse[25] = 1.0;
        let g = apply_transform(
            &signal(impulse),
            &TransformStep::Smooth {
                method: SmoothMethod::Gaussian,
                window_sec: 0.02,
            },
        )
        .unwrap()
        .values;
        assert!(g[25] < 1.0 && g[24] > 0.0 && (g[24] - g[26]).abs() < 1e-6);
        let total: f32 = g.iter().sum();
        assert!((total - 1.0).abs() < 1e-4, "interior Gaussian preserves area");
    }

    #[test]
    fn test_polarity_and_serde() {
        let s = signal(vec![-2.0, 3.0]);
        let out = apply_transform(&s, &TransformStep::Polarity { mode: PolarityMode::Magnitude }).unwrap();
        assert_eq!(out.values, vec![2.0, 3.0]);

        let json = r#"[{"type":"scale","factor":2.0},{"type":"clamp","min":0.0,"max":1.0}]"#;
        let steps: Vec<TransformStep> = serde_json::from_str(json).unwrap();
        assert_eq!(
            steps[0],
            TransformStep::Scale {
                factor: 2.0,
                offset: 0.0
            }
        );
    }
}
