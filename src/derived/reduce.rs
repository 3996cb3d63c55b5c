//! 2D → 1D reducers
//!
//! Collapse each frame of a time-aligned matrix (optionally restricted to a bin range) to a
//! single value.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::features::spectral::{spectral_centroid_frames, spectral_flux_frames, InactiveMode};
use crate::features::{Matrix2D, Signal1D};
use crate::spectrum::cqt::CqtSpectrogram;
use crate::spectrum::mel::MelSpectrogram;
use crate::spectrum::stft::Spectrogram;

/// Anything that yields time-aligned frames with a known bin axis
pub trait FrameSource {
    /// `frames[frame][bin]`
    fn frames(&self) -> &[Vec<f32>];

    /// Frame times in seconds
    fn times(&self) -> &[f32];

    /// Value of each bin on the frequency axis (Hz, or index for non-spectral matrices)
    fn bin_frequencies(&self) -> Vec<f32>;
}

impl FrameSource for Spectrogram {
    fn frames(&self) -> &[Vec<f32>] {
        &self.magnitudes
    }

    fn times(&self) -> &[f32] {
        &self.times
    }

    fn bin_frequencies(&self) -> Vec<f32> {
        self.frequencies()
    }
}

impl FrameSource for MelSpectrogram {
    fn frames(&self) -> &[Vec<f32>] {
        &self.mel_bands
    }

    fn times(&self) -> &[f32] {
        &self.times
    }

    fn bin_frequencies(&self) -> Vec<f32> {
        self.band_frequencies.clone()
    }
}

impl FrameSource for CqtSpectrogram {
    fn frames(&self) -> &[Vec<f32>] {
        &self.magnitudes
    }

    fn times(&self) -> &[f32] {
        &self.times
    }

    fn bin_frequencies(&self) -> Vec<f32> {
        self.bin_frequencies.clone()
    }
}

impl FrameSource for Matrix2D {
    fn frames(&self) -> &[Vec<f32>] {
        &self.values
    }

    fn times(&self) -> &[f32] {
        &self.times
    }

    fn bin_frequencies(&self) -> Vec<f32> {
        self.bin_axis.clone()
    }
}

/// Per-frame reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionKind {
    /// Mean over bins
    Mean,
    /// Maximum over bins
    Max,
    /// Sum over bins
    Sum,
    /// Population variance over bins
    Variance,
    /// Root mean square over bins
    Amplitude,
    /// L1 distance of L1-normalized consecutive frames
    SpectralFlux,
    /// Bin-axis weighted centroid
    SpectralCentroid,
    /// Mean rectified increase from the previous frame
    OnsetStrength,
}

/// Half-open bin range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRange {
    /// First bin
    pub start: usize,
    /// One past the last bin
    pub end: usize,
}

fn resolve_range(range: Option<BinRange>, n_bins: usize) -> Result<(usize, usize), AnalysisError> {
    let (start, end) = match range {
        Some(r) => (r.start, r.end.min(n_bins)),
        None => (0, n_bins),
    };
    if start >= end {
        return Err(AnalysisError::InvalidInput(format!(
            "Empty bin range {}..{} for {} bins",
            start, end, n_bins
        )));
    }
    Ok((start, end))
}

/// Reduce every frame of `source` to one value
///
/// # Arguments
///
/// * `source` - Frames to reduce
/// * `kind` - Reduction to apply
/// * `bin_range` - Optional bin subset; `end` is clamped to the bin count
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if the bin range is empty after clamping or the
/// source's frame and time counts differ.
pub fn reduce(
    source: &dyn FrameSource,
    kind: ReductionKind,
    bin_range: Option<BinRange>,
) -> Result<Signal1D, AnalysisError> {
    let frames = source.frames();
    let times = source.times();
    if frames.len() != times.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "Source has {} frames but {} times",
            frames.len(),
            times.len()
        )));
    }
    if frames.is_empty() {
        return Ok(Signal1D::default());
    }

    let n_bins = frames.iter().map(Vec::len).min().unwrap_or(0);
    let (start, end) = resolve_range(bin_range, n_bins)?;
    let width = (end - start) as f32;

    log::debug!(
        "Reducing {} frames with {:?} over bins {}..{}",
        frames.len(),
        kind,
        start,
        end
    );

    let slice = |frame: &Vec<f32>| -> Vec<f32> { frame[start..end].to_vec() };

    let values = match kind {
        ReductionKind::Mean => frames
            .iter()
            .map(|f| f[start..end].iter().sum::<f32>() / width)
            .collect(),
        ReductionKind::Max => frames
            .iter()
            .map(|f| f[start..end].iter().copied().fold(f32::NEG_INFINITY, f32::max))
            .collect(),
        ReductionKind::Sum => frames.iter().map(|f| f[start..end].iter().sum()).collect(),
        ReductionKind::Variance => frames
            .iter()
            .map(|f| {
                let bins = &f[start..end];
                let mean = bins.iter().sum::<f32>() / width;
                bins.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / width
            })
            .collect(),
        ReductionKind::Amplitude => frames
            .iter()
            .map(|f| (f[start..end].iter().map(|v| v * v).sum::<f32>() / width).sqrt())
            .collect(),
        ReductionKind::SpectralFlux => {
            let sliced: Vec<Vec<f32>> = frames.iter().map(slice).collect();
            spectral_flux_frames(&sliced, None)
        }
        ReductionKind::SpectralCentroid => {
            let sliced: Vec<Vec<f32>> = frames.iter().map(slice).collect();
            let freqs = source.bin_frequencies();
            let freqs = freqs.get(start..end).unwrap_or(&[]).to_vec();
            spectral_centroid_frames(&sliced, &freqs, None, InactiveMode::Zero)
        }
        ReductionKind::OnsetStrength => {
            let mut out = Vec::with_capacity(frames.len());
            out.push(0.0);
            for pair in frames.windows(2) {
                let rise: f32 = pair[0][start..end]
                    .iter()
                    .zip(&pair[1][start..end])
                    .map(|(p, c)| (c - p).max(0.0))
                    .sum();
                out.push(rise / width);
            }
            out
        }
    };

    Ok(Signal1D::new(times.to_vec(), values))
}
