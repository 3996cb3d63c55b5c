//! Derived signals
//!
//! Generic engines that turn analysis outputs into control signals:
//! - 2D → 1D reducers over any [`FrameSource`](reduce::FrameSource)
//! - 1D transform chains
//! - Event stream → 1D signal rendering
//!
//! [`derive_signal`] strings them together: one source, then a transform chain.

pub mod event_signal;
pub mod reduce;
pub mod transform;

pub use event_signal::{events_to_signal, EnvelopeShape, EventSignalMode};
pub use reduce::{reduce, BinRange, FrameSource, ReductionKind};
pub use transform::{apply_transform, apply_transform_chain, TransformStep};

use crate::error::AnalysisError;
use crate::events::peak_picking::Event;
use crate::features::Signal1D;

/// Where a derived signal starts
pub enum DerivedSource<'a> {
    /// Reduce a 2D source
    Reduction {
        /// Frames to reduce
        source: &'a dyn FrameSource,
        /// Reduction to apply
        kind: ReductionKind,
        /// Optional bin subset
        bin_range: Option<BinRange>,
    },
    /// Render events onto a time axis
    Events {
        /// Events to render
        events: &'a [Event],
        /// Output time axis
        times: &'a [f32],
        /// Rendering mode
        mode: EventSignalMode,
    },
    /// Start from an existing signal
    Signal(&'a Signal1D),
}

/// Build a signal from `source` and run it through `steps`
///
/// # Errors
///
/// Propagates the source's and the steps' `AnalysisError::InvalidInput`.
pub fn derive_signal(
    source: DerivedSource<'_>,
    steps: &[TransformStep],
) -> Result<Signal1D, AnalysisError> {
    let base = match source {
        DerivedSource::Reduction {
            source,
            kind,
            bin_range,
        } => reduce(source, kind, bin_range)?,
        DerivedSource::Events {
            events,
            times,
            mode,
        } => events_to_signal(events, times, mode)?,
        DerivedSource::Signal(signal) => signal.clone(),
    };
    apply_transform_chain(&base, steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Matrix2D;
    use crate::derived::transform::NormalizeMethod;

    #[test]
    fn test_reduction_then_normalize() {
        let m = Matrix2D {
            times: vec![0.0, 0.1, 0.2],
            values: vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]],
            bin_axis: vec![0.0, 1.0],
        };
        let out = derive_signal(
            DerivedSource::Reduction {
                source: &m,
                kind: ReductionKind::Sum,
                bin_range: None,
            },
            &[TransformStep::Normalize {
                method: NormalizeMethod::MinMax,
            }],
        )
        .unwrap();
        assert_eq!(out.values, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_events_source() {
        let events = [Event {
            time: 0.1,
            weight: 0.8,
        }];
        let times = [0.0, 0.1, 0.2];
        let out = derive_signal(
            DerivedSource::Events {
                events: &events,
                times: &times,
                mode: EventSignalMode::Envelope {
                    shape: EnvelopeShape::Impulse,
                },
            },
            &[TransformStep::Scale {
                factor: 10.0,
                offset: 0.0,
            }],
        )
        .unwrap();
        assert_eq!(out.values, vec![0.0, 8.0, 0.0]);
    }
}
