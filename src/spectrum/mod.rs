//! Spectral front end
//!
//! - FFT and window engine
//! - STFT magnitude spectrogram
//! - Mel and constant-Q projections
//! - MFCC

pub mod cqt;
pub mod fft;
pub mod mel;
pub mod mfcc;
pub mod stft;

pub use cqt::{compute_cqt, cqt_bin_to_hz, hz_to_cqt_bin, CqtSpectrogram};
pub use fft::{fft, hann_window, magnitude_spectrum};
pub use mel::{compute_mel_spectrogram, hz_to_mel, mel_to_hz, MelFilterbank, MelSpectrogram};
pub use mfcc::{compute_mfcc, Mfcc};
pub use stft::{compute_spectrogram, Spectrogram};
