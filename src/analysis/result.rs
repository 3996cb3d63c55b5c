//! Run results
//!
//! Every run returns one [`RunOutput`] wrapped with [`RunMeta`] (backend, accelerator use,
//! timings). Results are plain data: immutable once produced and serializable for
//! external caches.

use serde::{Deserialize, Serialize};

use crate::analysis::request::Backend;
use crate::bands::proposals::BandProposalResult;
use crate::bands::scoped::{BandCqt1DResult, BandEventsResult, BandMir1DResult};
use crate::events::beat_candidates::BeatCandidateResult;
use crate::events::peak_picking::EventStream;
use crate::features::{Matrix2D, Signal1D};
use crate::preprocessing::activity::ActivitySignal;
use crate::tempo::hypotheses::TempoHypothesisResult;

/// Wall-clock timings of one run in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Timings {
    /// Whole run, including validation
    pub total_ms: f64,
    /// Time spent in CPU stages
    pub cpu_ms: f64,
    /// Time spent in accelerator calls (0 when none ran)
    pub gpu_ms: f64,
}

/// Observability envelope attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    /// Backend the request asked for
    pub backend: Backend,
    /// True when at least one stage actually ran on the accelerator
    pub used_gpu: bool,
    /// Timings
    pub timings: Timings,
    /// Crate version that produced the result
    pub algorithm_version: String,
}

impl RunMeta {
    /// Envelope for `backend` with zeroed timings
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            used_gpu: false,
            timings: Timings::default(),
            algorithm_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Output of a run, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RunOutput {
    /// Time series
    #[serde(rename = "1d")]
    OneD(Signal1D),
    /// Time-aligned matrix
    #[serde(rename = "2d")]
    TwoD(Matrix2D),
    /// Picked events
    Events(EventStream),
    /// Beat candidates
    BeatCandidates(BeatCandidateResult),
    /// Tempo hypotheses
    TempoHypotheses(TempoHypothesisResult),
    /// Activity signal
    Activity(ActivitySignal),
    /// Band-scoped STFT feature
    BandMir1d(BandMir1DResult),
    /// Band-scoped CQT signal
    BandCqt1d(BandCqt1DResult),
    /// Band-scoped events
    BandEvents(BandEventsResult),
    /// Band proposals
    BandProposals(BandProposalResult),
}

impl RunOutput {
    /// Short name of the variant (matches the serialized tag)
    pub fn kind(&self) -> &'static str {
        match self {
            RunOutput::OneD(_) => "1d",
            RunOutput::TwoD(_) => "2d",
            RunOutput::Events(_) => "events",
            RunOutput::BeatCandidates(_) => "beat_candidates",
            RunOutput::TempoHypotheses(_) => "tempo_hypotheses",
            RunOutput::Activity(_) => "activity",
            RunOutput::BandMir1d(_) => "band_mir_1d",
            RunOutput::BandCqt1d(_) => "band_cqt_1d",
            RunOutput::BandEvents(_) => "band_events",
            RunOutput::BandProposals(_) => "band_proposals",
        }
    }

    /// The 1D signal, if this output is one
    pub fn as_signal(&self) -> Option<&Signal1D> {
        match self {
            RunOutput::OneD(signal) => Some(signal),
            RunOutput::BandMir1d(r) => Some(&r.signal),
            RunOutput::BandCqt1d(r) => Some(&r.signal),
            _ => None,
        }
    }

    /// The matrix, if this output is one
    pub fn as_matrix(&self) -> Option<&Matrix2D> {
        match self {
            RunOutput::TwoD(m) => Some(m),
            _ => None,
        }
    }

    /// Advisory warnings carried by the output
    pub fn warnings(&self) -> Vec<String> {
        match self {
            RunOutput::OneD(_) | RunOutput::TwoD(_) | RunOutput::Activity(_) => Vec::new(),
            RunOutput::Events(e) => e.warnings.clone(),
            RunOutput::BeatCandidates(r) => r.warnings.clone(),
            RunOutput::TempoHypotheses(r) => r.warnings.clone(),
            RunOutput::BandMir1d(r) => r.diagnostics.warnings.clone(),
            RunOutput::BandCqt1d(r) => r.diagnostics.warnings.clone(),
            RunOutput::BandEvents(r) => {
                let mut all = r.diagnostics.warnings.clone();
                all.extend(r.events.warnings.iter().cloned());
                all
            }
            RunOutput::BandProposals(r) => r.warnings.clone(),
        }
    }
}

/// Result of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Observability envelope
    pub meta: RunMeta,
    /// Computed output
    pub output: RunOutput,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_tagging() {
        let out = RunOutput::OneD(Signal1D::new(vec![0.0, 0.5], vec![1.0, 2.0]));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["kind"], "1d");
        assert_eq!(json["data"]["values"][1], 2.0);
        assert_eq!(out.kind(), "1d");

        let back: RunOutput = serde_json::from_value(json).unwrap();
        assert_eq!(back, out);
    }

    #[test]
    fn test_meta_defaults() {
        let meta = RunMeta::new(Backend::Gpu);
        assert!(!meta.used_gpu);
        assert_eq!(meta.timings, Timings::default());
        assert_eq!(meta.algorithm_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_accessors() {
        let out = RunOutput::Events(EventStream {
            events: vec![],
            threshold: 0.0,
            warnings: vec!["No events".to_string()],
        });
        assert!(out.as_signal().is_none());
        assert!(out.as_matrix().is_none());
        assert_eq!(out.warnings(), vec!["No events".to_string()]);
    }
}
