//! Feature extraction modules
//!
//! This module contains the frame-level feature extractors:
//! - Spectral centroid and spectral flux
//! - Onset and amplitude envelopes
//! - CQT-derived harmonic energy, bass pitch motion and tonal stability
//! - Harmonic/percussive separation (HPSS)
//!
//! plus the two plain containers every extractor returns: [`Signal1D`] and [`Matrix2D`].

use serde::{Deserialize, Serialize};

pub mod cqt_signals;
pub mod hpss;
pub mod onset;
pub mod spectral;
pub mod stats;

use crate::spectrum::cqt::CqtSpectrogram;
use crate::spectrum::mel::MelSpectrogram;
use crate::spectrum::mfcc::Mfcc;
use crate::spectrum::stft::Spectrogram;

/// Time-aligned 1D signal (one value per frame)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Signal1D {
    /// Frame times in seconds
    pub times: Vec<f32>,
    /// One value per frame
    pub values: Vec<f32>,
}

impl Signal1D {
    /// Pair times with values
    pub fn new(times: Vec<f32>, values: Vec<f32>) -> Self {
        Self { times, values }
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when there are no frames
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Frames per second, derived from the time axis (0 for fewer than two frames)
    pub fn frame_rate(&self) -> f32 {
        let period = stats::frame_period(&self.times, 0.0);
        if period > 0.0 {
            1.0 / period
        } else {
            0.0
        }
    }

    /// Same time axis, new values
    pub fn with_values(&self, values: Vec<f32>) -> Signal1D {
        Signal1D {
            times: self.times.clone(),
            values,
        }
    }
}

/// Time-aligned 2D matrix (`values[frame][bin]`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Matrix2D {
    /// Frame times in seconds
    pub times: Vec<f32>,
    /// `values[frame][bin]`
    pub values: Vec<Vec<f32>>,
    /// Value of the bin axis: Hz for spectral matrices, coefficient index for MFCC
    pub bin_axis: Vec<f32>,
}

impl Matrix2D {
    /// Number of frames
    pub fn num_frames(&self) -> usize {
        self.values.len()
    }

    /// Number of bins per frame
    pub fn num_bins(&self) -> usize {
        self.bin_axis.len()
    }
}

impl From<&Spectrogram> for Matrix2D {
    fn from(spec: &Spectrogram) -> Self {
        Self {
            times: spec.times.clone(),
            values: spec.magnitudes.clone(),
            bin_axis: spec.frequencies(),
        }
    }
}

impl From<&MelSpectrogram> for Matrix2D {
    fn from(mel: &MelSpectrogram) -> Self {
        Self {
            times: mel.times.clone(),
            values: mel.mel_bands.clone(),
            bin_axis: mel.band_frequencies.clone(),
        }
    }
}

impl From<&CqtSpectrogram> for Matrix2D {
    fn from(cqt: &CqtSpectrogram) -> Self {
        Self {
            times: cqt.times.clone(),
            values: cqt.magnitudes.clone(),
            bin_axis: cqt.bin_frequencies.clone(),
        }
    }
}

impl From<&Mfcc> for Matrix2D {
    fn from(mfcc: &Mfcc) -> Self {
        let n = mfcc.coefficients.first().map(Vec::len).unwrap_or(0);
        Self {
            times: mfcc.times.clone(),
            values: mfcc.coefficients.clone(),
            bin_axis: (0..n).map(|k| k as f32).collect(),
        }
    }
}
