//! Amplitude envelope (windowed RMS on samples)

use crate::error::AnalysisError;
use crate::features::Signal1D;
use crate::spectrum::stft::frame_count;

/// Windowed RMS of `samples`
///
/// Frames are laid out exactly like the STFT (`frame_size` window every `hop_size`
/// samples, trailing partial frame dropped, stamped with the window-center time) so the
/// result aligns with spectrogram-based features.
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` for a zero sample rate, frame or hop size.
pub fn amplitude_envelope(
    samples: &[f32],
    sample_rate: u32,
    frame_size: usize,
    hop_size: usize,
) -> Result<Signal1D, AnalysisError> {
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidInput("Invalid sample rate".to_string()));
    }
    if frame_size == 0 || hop_size == 0 {
        return Err(AnalysisError::InvalidInput(
            "Frame and hop size must be > 0".to_string(),
        ));
    }

    let num_frames = frame_count(samples.len(), frame_size, hop_size);
    log::debug!(
        "Computing amplitude envelope: {} samples, frame={}, hop={}, {} frames",
        samples.len(),
        frame_size,
        hop_size,
        num_frames
    );

    let half = frame_size as f32 / 2.0;
    let mut times = Vec::with_capacity(num_frames);
    let mut values = Vec::with_capacity(num_frames);
    for frame in 0..num_frames {
        let start = frame * hop_size;
        let window = &samples[start..start + frame_size];
        let sum_sq: f64 = window.iter().map(|&x| (x as f64) * (x as f64)).sum();
        values.push((sum_sq / frame_size as f64).sqrt() as f32);
        times.push((start as f32 + half) / sample_rate as f32);
    }

    Ok(Signal1D::new(times, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_sine_rms() {
        let sr = 8000;
        let samples: Vec<f32> = (0..sr)
            .map(|i| (2.0 * PI * 250.0 * i as f32 / sr as f32).sin())
            .collect();
        let env = amplitude_envelope(&samples, sr, 256, 128).unwrap();
        assert_eq!(env.len(), (8000 - 256) / 128 + 1);
        for &v in &env.values {
            assert!((v - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        }
    }

    #[test]
    fn test_alignment_with_stft_times() {
        let env = amplitude_envelope(&[0.0; 4096], 44100, 2048, 512).unwrap();
        assert!((env.times[0] - 1024.0 / 44100.0).abs() < 1e-7);
        assert!(env.values.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(amplitude_envelope(&[0.0; 10], 0, 4, 2).is_err());
        assert!(amplitude_envelope(&[0.0; 10], 8000, 0, 2).is_err());
        assert!(amplitude_envelope(&[0.0; 2], 8000, 4, 2).unwrap().is_empty());
    }
}
