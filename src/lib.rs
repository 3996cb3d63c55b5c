//! # Spectral MIR
//!
//! Deterministic music information retrieval on decoded PCM: spectral representations,
//! silence-aware 1D features, event extraction, tempo inference and frequency-band scoped
//! analysis.
//!
//! ## Features
//!
//! - **Spectra**: Hann-windowed STFT, log-mel, constant-Q (cached kernel banks), MFCC
//! - **Activity gating**: adaptive noise floor with hysteresis, hangover and onset suppression
//! - **1D features**: onset envelope, spectral centroid and flux, RMS, CQT tonal signals
//! - **HPSS**: median-filter harmonic/percussive separation
//! - **Events and tempo**: peak picking, beat candidates, tempo hypotheses with harmonic
//!   families, phase alignment, beat grids
//! - **Bands**: time-varying frequency bands, soft masks, band-scoped features, proposals
//! - **Derived signals**: reducers, transform chains and event rendering
//!
//! ## Quick Start
//!
//! ```no_run
//! use spectral_mir::{run_analysis, CancellationToken, FunctionId, PcmBuffer, RunOutput, RunRequest};
//!
//! // Decoded mono audio
//! let samples: Vec<f32> = vec![]; // Your audio data
//! let audio = PcmBuffer::mono(44100, samples);
//!
//! let result = run_analysis(
//!     &audio,
//!     &RunRequest::new(FunctionId::TempoHypotheses),
//!     &CancellationToken::none(),
//! )?;
//!
//! if let RunOutput::TempoHypotheses(tempo) = &result.output {
//!     for h in &tempo.hypotheses {
//!         println!("{}: {:.1} BPM (confidence {:.2})", h.id, h.bpm, h.confidence);
//!     }
//! }
//! println!("took {:.1} ms", result.meta.timings.total_ms);
//! # Ok::<(), spectral_mir::AnalysisError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! PCM → mono → STFT → mel / CQT → activity → features → events → tempo / phase
//!                                     └──────→ band masks → band-scoped features
//! ```
//!
//! Every stage is also callable directly; the runner in [`analysis`] only resolves
//! prerequisites and attaches metadata.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod bands;
pub mod cancel;
pub mod config;
pub mod derived;
pub mod error;
pub mod events;
pub mod features;
pub mod preprocessing;
pub mod spectrum;
pub mod tempo;

// Re-export main types
pub use analysis::{
    run_analysis, Accelerator, AnalysisRunner, Backend, FunctionId, GpuContext, RunMeta,
    RunOutput, RunRequest, RunResult,
};
pub use bands::{FrequencyBand, TimeScope};
pub use cancel::CancellationToken;
pub use error::AnalysisError;
pub use events::{BeatCandidate, Event, EventStream};
pub use features::{Matrix2D, Signal1D};
pub use preprocessing::{AudioSource, PcmBuffer};
pub use tempo::{BeatGrid, TempoHypothesis};
