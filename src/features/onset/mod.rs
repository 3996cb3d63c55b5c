//! Onset-style envelopes
//!
//! - Onset strength envelope (mel or spectrogram input, bin and silence gating)
//! - Amplitude envelope (windowed RMS on samples)

pub mod amplitude;
pub mod envelope;

pub use amplitude::amplitude_envelope;
pub use envelope::{onset_envelope, onset_envelope_frames, OnsetInput};
