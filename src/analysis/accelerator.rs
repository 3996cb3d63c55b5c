//! Optional accelerator seam
//!
//! Two inner loops may be offloaded: the linear mel projection and HPSS mask estimation.
//! The CPU implementations stay the reference; the runner checks accelerator output and
//! falls back to the CPU on any error unless the request sets `strict_gpu`.
//!
//! The crate never builds a device itself. Callers wrap whatever they have in a
//! [`GpuContext`] and hand it to the runner.

use std::fmt;
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::config::HpssConfig;
use crate::error::AnalysisError;
use crate::features::hpss::{estimate_hpss_masks, HpssMasks};
use crate::spectrum::mel::MelFilterbank;

/// Median window the accelerated HPSS kernel uses in both directions
pub const GPU_HPSS_KERNEL: usize = 9;

/// Accelerated implementations of the offloadable stages
pub trait Accelerator: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Linear mel projection of every frame (`result[frame][mel]`, before log compression)
    ///
    /// # Errors
    ///
    /// Any error makes the runner recompute on the CPU (or fail when strict).
    fn mel_project(
        &self,
        frames: &[Vec<f32>],
        filterbank: &MelFilterbank,
    ) -> Result<Vec<Vec<f32>>, AnalysisError>;

    /// Soft or hard HPSS masks for `frames`
    ///
    /// Implementations may use a fixed median window of [`GPU_HPSS_KERNEL`] instead of the
    /// configured kernels.
    ///
    /// # Errors
    ///
    /// Any error makes the runner recompute on the CPU (or fail when strict).
    fn hpss_masks(
        &self,
        frames: &[Vec<f32>],
        config: &HpssConfig,
    ) -> Result<HpssMasks, AnalysisError>;
}

/// Opaque handle to an accelerator, cheap to clone and share across runs
#[derive(Clone)]
pub struct GpuContext {
    accelerator: Arc<dyn Accelerator>,
}

impl GpuContext {
    /// Wrap an accelerator
    pub fn new(accelerator: Arc<dyn Accelerator>) -> Self {
        Self { accelerator }
    }

    /// The wrapped accelerator
    pub fn accelerator(&self) -> &dyn Accelerator {
        self.accelerator.as_ref()
    }
}

impl fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuContext")
            .field("accelerator", &self.accelerator.name())
            .finish()
    }
}

/// CPU stand-in that reproduces the accelerated kernels' numerics
///
/// Mel projection is exact; HPSS uses the fixed median-of-9 window. Useful for checking
/// the fallback paths and the mask divergence without a device.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmulatedAccelerator;

impl Accelerator for EmulatedAccelerator {
    fn name(&self) -> &str {
        "emulated"
    }

    fn mel_project(
        &self,
        frames: &[Vec<f32>],
        filterbank: &MelFilterbank,
    ) -> Result<Vec<Vec<f32>>, AnalysisError> {
        let expected = filterbank.fft_size / 2 + 1;
        if let Some(frame) = frames.iter().find(|f| f.len() != expected) {
            return Err(AnalysisError::GpuError(format!(
                "Mel kernel expects {} bins per frame, got {}",
                expected,
                frame.len()
            )));
        }
        Ok(filterbank.project_frames(frames))
    }

    fn hpss_masks(
        &self,
        frames: &[Vec<f32>],
        config: &HpssConfig,
    ) -> Result<HpssMasks, AnalysisError> {
        let fixed = HpssConfig {
            harmonic_kernel: GPU_HPSS_KERNEL,
            percussive_kernel: GPU_HPSS_KERNEL,
            ..config.clone()
        };
        estimate_hpss_masks(frames, &fixed, &CancellationToken::none())
            .map_err(|e| AnalysisError::GpuError(format!("HPSS kernel failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MelConfig;

    #[test]
    fn test_emulated_mel_matches_cpu() {
        let bank = MelFilterbank::new(&MelConfig::default(), 1024, 22050).unwrap();
        let frames: Vec<Vec<f32>> = (0..4)
            .map(|i| (0..513).map(|b| ((b + i) % 7) as f32).collect())
            .collect();
        let gpu = EmulatedAccelerator.mel_project(&frames, &bank).unwrap();
        assert_eq!(gpu, bank.project_frames(&frames));
    }

    #[test]
    fn test_emulated_mel_rejects_wrong_shape() {
        let bank = MelFilterbank::new(&MelConfig::default(), 1024, 22050).unwrap();
        let result = EmulatedAccelerator.mel_project(&[vec![0.0; 100]], &bank);
        assert!(matches!(result, Err(AnalysisError::GpuError(_))));
    }

    #[test]
    fn test_emulated_hpss_uses_fixed_kernel() {
        let frames: Vec<Vec<f32>> = (0..30)
            .map(|t| (0..40).map(|b| if t == 15 || b == 10 { 1.0 } else { 0.01 }).collect())
            .collect();
        let cfg = HpssConfig::default();
        let gpu = EmulatedAccelerator.hpss_masks(&frames, &cfg).unwrap();
        let fixed = HpssConfig {
            harmonic_kernel: GPU_HPSS_KERNEL,
            percussive_kernel: GPU_HPSS_KERNEL,
            ..cfg
        };
        let cpu9 = estimate_hpss_masks(&frames, &fixed, &CancellationToken::none()).unwrap();
        assert_eq!(gpu.max_abs_difference(&cpu9), Some(0.0));
    }

    #[test]
    fn test_context_debug_names_backend() {
        let ctx = GpuContext::new(Arc::new(EmulatedAccelerator));
        assert!(format!("{:?}", ctx).contains("emulated"));
        assert_eq!(ctx.accelerator().name(), "emulated");
    }
}
