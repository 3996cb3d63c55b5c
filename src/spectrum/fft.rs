//! FFT and window engine
//!
//! Thin layer over `rustfft` enforcing the power-of-two contract of the analysis pipeline,
//! plus the periodic Hann window and half-spectrum magnitude extraction.
//!
//! # Example
//!
//! ```
//! use spectral_mir::spectrum::fft::{fft, magnitude_spectrum};
//!
//! let mut real = vec![0.0f32; 8];
//! let mut imag = vec![0.0f32; 8];
//! real[0] = 1.0; // unit impulse
//! fft(&mut real, &mut imag)?;
//!
//! let mags = magnitude_spectrum(&real, &imag);
//! assert_eq!(mags.len(), 5);
//! assert!(mags.iter().all(|&m| (m - 1.0).abs() < 1e-6));
//! # Ok::<(), spectral_mir::AnalysisError>(())
//! ```

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};

use crate::error::AnalysisError;

fn check_power_of_two(n: usize) -> Result<(), AnalysisError> {
    if n == 0 || !n.is_power_of_two() {
        return Err(AnalysisError::InvalidInput(format!(
            "FFT length must be a power of two, got {}",
            n
        )));
    }
    Ok(())
}

/// In-place forward FFT of a split real/imaginary buffer
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if the buffers differ in length or the length is
/// not a power of two.
pub fn fft(real: &mut [f32], imag: &mut [f32]) -> Result<(), AnalysisError> {
    if real.len() != imag.len() {
        return Err(AnalysisError::InvalidInput(format!(
            "FFT buffers differ in length: real={}, imag={}",
            real.len(),
            imag.len()
        )));
    }
    check_power_of_two(real.len())?;

    let mut buffer: Vec<Complex32> = real
        .iter()
        .zip(imag.iter())
        .map(|(&re, &im)| Complex32::new(re, im))
        .collect();

    let mut planner = FftPlanner::<f32>::new();
    planner.plan_fft_forward(buffer.len()).process(&mut buffer);

    for (i, c) in buffer.iter().enumerate() {
        real[i] = c.re;
        imag[i] = c.im;
    }
    Ok(())
}

/// Periodic Hann window: `w[i] = 0.5 - 0.5 * cos(2πi / N)`
///
/// The periodic form (denominator `N`, not `N - 1`) sums to a constant under 50%/75%
/// overlap-add.
pub fn hann_window(size: usize) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

/// Magnitudes of bins `[0, N/2]` inclusive
pub fn magnitude_spectrum(real: &[f32], imag: &[f32]) -> Vec<f32> {
    let n_bins = real.len().min(imag.len()) / 2 + 1;
    real.iter()
        .zip(imag.iter())
        .take(n_bins)
        .map(|(&re, &im)| (re * re + im * im).sqrt())
        .collect()
}

/// Reusable windowed-FFT for a fixed frame size
///
/// Holds the FFT plan, the window and a scratch buffer so a frame loop allocates only its
/// output.
pub struct FrameTransform {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex32>,
}

impl FrameTransform {
    /// Plan a Hann-windowed transform of `fft_size` samples
    pub fn new(fft_size: usize) -> Result<Self, AnalysisError> {
        check_power_of_two(fft_size)?;
        let mut planner = FftPlanner::<f32>::new();
        Ok(Self {
            fft: planner.plan_fft_forward(fft_size),
            window: hann_window(fft_size),
            buffer: vec![Complex32::new(0.0, 0.0); fft_size],
        })
    }

    /// Frame length in samples
    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    /// Window, transform and return the half-spectrum magnitudes of `frame`
    ///
    /// `frame` shorter than the FFT size is zero-padded.
    pub fn magnitudes(&mut self, frame: &[f32]) -> Vec<f32> {
        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let sample = frame.get(i).copied().unwrap_or(0.0);
            *slot = Complex32::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let n_bins = self.window.len() / 2 + 1;
        self.buffer[..n_bins].iter().map(|c| c.norm()).collect()
    }
}
