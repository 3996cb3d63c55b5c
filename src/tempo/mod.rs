//! Tempo inference
//!
//! - Tempo hypotheses (inter-onset interval histogram with harmonic families)
//! - Phase alignment of a beat grid to candidates
//! - Beat grid generation

pub mod beat_grid;
pub mod hypotheses;
pub mod phase;

pub use beat_grid::{generate_beat_times, BeatGrid};
pub use hypotheses::{generate_tempo_hypotheses, TempoEvidence, TempoHypothesis, TempoHypothesisResult};
pub use phase::{align_phase, PhaseAlignmentResult, PhaseHypothesis};
