//! Frequency bands
//!
//! - Band model with pure segment/keyframe editing
//! - Masking of FFT and CQT frames with optional raised-cosine edges
//! - Band-scoped feature extraction and batches
//! - Automatic band proposals

pub mod mask;
pub mod model;
pub mod proposals;
pub mod scoped;

pub use mask::{mask_cqt, mask_spectrogram, BandDiagnostics, MaskedFrames};
pub use model::{BandProvenance, FrequencyBand, FrequencySegment, TimeScope};
pub use proposals::{propose_bands, BandProposal, BandProposalResult};
pub use scoped::{
    band_activity, band_cqt_1d, band_cqt_1d_batch, band_events, band_mir_1d, band_mir_1d_batch,
    BandAnalysisConfig, BandCqt1DResult, BandEventsResult, BandMir1DResult, BandMirFunction,
};
