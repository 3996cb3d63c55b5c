//! Event stream → 1D signal

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::events::peak_picking::Event;
use crate::features::Signal1D;

/// Gaussian envelopes are cut off beyond this many widths
const GAUSSIAN_SUPPORT: f32 = 4.0;

/// Attack-decay envelopes are cut off this many decay constants after the attack
const DECAY_SUPPORT: f32 = 8.0;

/// Shape drawn around each event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum EnvelopeShape {
    /// Weight at the nearest frame only
    Impulse,
    /// `exp(-d² / 2w²)` around the event
    Gaussian {
        /// Standard deviation in seconds
        width_sec: f32,
    },
    /// Linear rise over `attack_sec`, then exponential decay with time constant `decay_sec`
    AttackDecay {
        /// Rise time in seconds
        attack_sec: f32,
        /// Decay time constant in seconds
        decay_sec: f32,
    },
    /// 1 for `duration_sec` after the event
    Gate {
        /// Gate length in seconds
        duration_sec: f32,
    },
}

/// How events become a signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EventSignalMode {
    /// Events in a centered window
    EventCount {
        /// Window length in seconds
        window_sec: f32,
    },
    /// Events per second in a centered window
    EventDensity {
        /// Window length in seconds
        window_sec: f32,
    },
    /// Sum of weights in a centered window
    WeightedSum {
        /// Window length in seconds
        window_sec: f32,
    },
    /// Mean weight in a centered window (0 when empty)
    WeightedMean {
        /// Window length in seconds
        window_sec: f32,
    },
    /// Per-event envelope; overlapping envelopes are summed
    Envelope {
        /// Envelope shape
        shape: EnvelopeShape,
    },
}

fn invalid(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidInput(msg.into())
}

fn positive(name: &str, value: f32) -> Result<(), AnalysisError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(format!("{} must be > 0, got {}", name, value)));
    }
    Ok(())
}

fn windowed(events: &[Event], times: &[f32], window_sec: f32, reduce: impl Fn(&[Event]) -> f32) -> Vec<f32> {
    let half = window_sec / 2.0;
    times
        .iter()
        .map(|&t| {
            let lo = events.partition_point(|e| e.time < t - half);
            let hi = events.partition_point(|e| e.time <= t + half);
            reduce(&events[lo..hi])
        })
        .collect()
}

fn envelope_value(shape: EnvelopeShape, d: f32) -> f32 {
    match shape {
        EnvelopeShape::Impulse => 0.0,
        EnvelopeShape::Gaussian { width_sec } => (-(d * d) / (2.0 * width_sec * width_sec)).exp(),
        EnvelopeShape::AttackDecay {
            attack_sec,
            decay_sec,
        } => {
            if d < 0.0 {
                0.0
            } else if d < attack_sec {
                d / attack_sec
            } else if decay_sec > 0.0 {
                (-(d - attack_sec) / decay_sec).exp()
            } else if d <= attack_sec {
                1.0
            } else {
                0.0
            }
        }
        EnvelopeShape::Gate { duration_sec } => {
            if (0.0..duration_sec).contains(&d) {
                1.0
            } else {
                0.0
            }
        }
    }
}

fn envelope(events: &[Event], times: &[f32], shape: EnvelopeShape) -> Vec<f32> {
    let mut out = vec![0.0f32; times.len()];
    if times.is_empty() {
        return out;
    }

    for e in events {
        if let EnvelopeShape::Impulse = shape {
            // Nearest frame
            let idx = times.partition_point(|&t| t < e.time);
            let nearest = match (idx.checked_sub(1), times.get(idx)) {
                (Some(prev), Some(&next)) => {
                    if e.time - times[prev] <= next - e.time {
                        prev
                    } else {
                        idx
                    }
                }
                (Some(prev), None) => prev,
                (None, _) => 0,
            };
            out[nearest] += e.weight;
            continue;
        }

        let (from, to) = match shape {
            EnvelopeShape::Gaussian { width_sec } => (
                e.time - GAUSSIAN_SUPPORT * width_sec,
                e.time + GAUSSIAN_SUPPORT * width_sec,
            ),
            EnvelopeShape::AttackDecay {
                attack_sec,
                decay_sec,
            } => (e.time, e.time + attack_sec + DECAY_SUPPORT * decay_sec),
            EnvelopeShape::Gate { duration_sec } => (e.time, e.time + duration_sec),
            EnvelopeShape::Impulse => (e.time, e.time),
        };
        let lo = times.partition_point(|&t| t < from);
        let hi = times.partition_point(|&t| t <= to);
        for (slot, &t) in out[lo..hi].iter_mut().zip(&times[lo..hi]) {
            *slot += e.weight * envelope_value(shape, t - e.time);
        }
    }
    out
}

/// Render events onto a time axis
///
/// # Arguments
///
/// * `events` - Events (any order)
/// * `times` - Ascending output time axis
/// * `mode` - Windowed statistic or envelope
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for non-positive window or shape parameters
/// (attack and decay may be zero; a zero attack starts the decay immediately).
pub fn events_to_signal(
    events: &[Event],
    times: &[f32],
    mode: EventSignalMode,
) -> Result<Signal1D, AnalysisError> {
    let mut sorted = events.to_vec();
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    log::debug!(
        "Rendering {} events onto {} frames ({:?})",
        sorted.len(),
        times.len(),
        mode
    );

    let values = match mode {
        EventSignalMode::EventCount { window_sec } => {
            positive("window_sec", window_sec)?;
            windowed(&sorted, times, window_sec, |w| w.len() as f32)
        }
        EventSignalMode::EventDensity { window_sec } => {
            positive("window_sec", window_sec)?;
            windowed(&sorted, times, window_sec, |w| w.len() as f32 / window_sec)
        }
        EventSignalMode::WeightedSum { window_sec } => {
            positive("window_sec", window_sec)?;
            windowed(&sorted, times, window_sec, |w| w.iter().map(|e| e.weight).sum())
        }
        EventSignalMode::WeightedMean { window_sec } => {
            positive("window_sec", window_sec)?;
            windowed(&sorted, times, window_sec, |w| {
                if w.is_empty() {
                    0.0
                } else {
                    w.iter().map(|e| e.weight).sum::<f32>() / w.len() as f32
                }
            })
        }
        EventSignalMode::Envelope { shape } => {
            match shape {
                EnvelopeShape::Impulse => {}
                EnvelopeShape::Gaussian { width_sec } => positive("width_sec", width_sec)?,
                EnvelopeShape::AttackDecay {
                    attack_sec,
                    decay_sec,
                } => {
                    if !attack_sec.is_finite()
                        || !decay_sec.is_finite()
                        || attack_sec < 0.0
                        || decay_sec < 0.0
                    {
                        return Err(invalid("attack_sec and decay_sec must be finite and >= 0"));
                    }
                }
                EnvelopeShape::Gate { duration_sec } => positive("duration_sec", duration_sec)?,
            }
            envelope(&sorted, times, shape)
        }
    };

    Ok(Signal1D::new(times.to_vec(), values))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 * 0.1).collect()
    }

    fn ev(time: f32, weight: f32) -> Event {
        Event { time, weight }
    }

    #[test]
    fn test_windowed_counts() {
        let events = vec![ev(0.5, 1.0), ev(0.55, 0.5), ev(2.0, 0.2)];
        let times = axis(30);
        let count = events_to_signal(&events, &times, EventSignalMode::EventCount { window_sec: 0.4 }).unwrap();
        assert_eq!(count.values[5], 2.0);
        assert_eq!(count.values[20], 1.0);
        assert_eq!(count.values[12], 0.0);

        let density =
            events_to_signal(&events, &times, EventSignalMode::EventDensity { window_sec: 0.4 }).unwrap();
        assert!((density.values[5] - 5.0).abs() < 1e-5);

        let mean =
            events_to_signal(&events, &times, EventSignalMode::WeightedMean { window_sec: 0.4 }).unwrap();
        assert!((mean.values[5] - 0.75).abs() < 1e-6);
        assert_eq!(mean.values[12], 0.0);

        let sum = events_to_signal(&events, &times, EventSignalMode::WeightedSum { window_sec: 0.4 }).unwrap();
        assert!((sum.values[5] - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_impulse_nearest_frame() {
        let times = axis(10);
        let s = events_to_signal(
            &[ev(0.34, 0.7)],
            &times,
            EventSignalMode::Envelope {
                shape: EnvelopeShape::Impulse,
            },
        )
        .unwrap();
        assert_eq!(s.values[3], 0.7);
        assert_eq!(s.values.iter().filter(|&&v| v > 0.0).count(), 1);
    }

    #[test]
    fn test_attack_decay_and_gate() {
        let times = axis(40);
        let ad = events_to_signal(
            &[ev(1.0, 1.0)],
            &times,
            EventSignalMode::Envelope {
                shape: EnvelopeShape::AttackDecay {
                    attack_sec: 0.2,
                    decay_sec: 0.5,
                },
            },
        )
        .unwrap()
        .values;
        assert_eq!(ad[9], 0.0);
        assert!((ad[11] - 0.5).abs() < 1e-4);
        assert!((ad[12] - 1.0).abs() < 1e-4);
        assert!(ad[17] < ad[12] && ad[17] > 0.0);

        let gate = events_to_signal(
            &[ev(1.0, 0.5)],
            &times,
            EventSignalMode::Envelope {
                shape: EnvelopeShape::Gate { duration_sec: 0.35 },
            },
        )
        .unwrap()
        .values;
        assert_eq!(&gate[9..15], &[0.0, 0.5, 0.5, 0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_overlapping_envelopes_sum() {
        let times = axis(10);
        let gate = events_to_signal(
            &[ev(0.0, 1.0), ev(0.05, 1.0)],
            &times,
            EventSignalMode::Envelope {
                shape: EnvelopeShape::Gate { duration_sec: 0.5 },
            },
        )
        .unwrap()
        .values;
        assert_eq!(gate[0], 1.0);
        for v in &gate[1..5] {
            assert!((v - 2.0).abs() < 1e-6, "overlapping gates gave {}", v);
        }

        let times = axis(30);
        let gauss = events_to_signal(
            &[ev(1.0, 1.0), ev(1.1, 0.5)],
            &times,
            EventSignalMode::Envelope {
                shape: EnvelopeShape::Gaussian { width_sec: 0.1 },
            },
        )
        .unwrap()
        .values;
        let expected = 1.0 + 0.5 * (-0.5f32).exp();
        assert!((gauss[10] - expected).abs() < 1e-4, "{} vs {}", gauss[10], expected);
        assert!(gauss[10] > 1.0);
    }

    #[test]
    fn test_impulses_on_same_frame_add() {
        let times = axis(10);
        let s = events_to_signal(
            &[ev(0.31, 0.5), ev(0.29, 0.25)],
            &times,
            EventSignalMode::Envelope {
                shape: EnvelopeShape::Impulse,
            },
        )
        .unwrap();
        assert!((s.values[3] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_parameters() {
        let times = axis(5);
        assert!(events_to_signal(&[], &times, EventSignalMode::EventCount { window_sec: 0.0 }).is_err());
        assert!(events_to_signal(
            &[],
            &times,
            EventSignalMode::Envelope {
                shape: EnvelopeShape::Gaussian { width_sec: -1.0 }
            }
        )
        .is_err());
    }
}
