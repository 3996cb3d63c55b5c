//! Mel-frequency cepstral coefficients
//!
//! Orthonormal DCT-II over the log-mel bands of each frame, keeping the first `n_coeffs`.

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use super::mel::MelSpectrogram;
use crate::config::MfccConfig;
use crate::error::AnalysisError;

/// Cepstral coefficients per frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mfcc {
    /// Frame times in seconds
    pub times: Vec<f32>,
    /// `coefficients[frame][k]`
    pub coefficients: Vec<Vec<f32>>,
}

/// Orthonormal DCT-II basis, `n_coeffs` rows of length `n_inputs`
fn dct_basis(n_coeffs: usize, n_inputs: usize) -> Vec<Vec<f32>> {
    let n = n_inputs as f32;
    (0..n_coeffs)
        .map(|k| {
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            (0..n_inputs)
                .map(|i| scale * (PI * k as f32 * (i as f32 + 0.5) / n).cos())
                .collect()
        })
        .collect()
}

/// Compute MFCCs from a log-mel spectrogram
///
/// # Errors
///
/// Returns `AnalysisError::InvalidInput` if `n_coeffs` is zero or exceeds the number of
/// mel bands.
pub fn compute_mfcc(mel: &MelSpectrogram, config: &MfccConfig) -> Result<Mfcc, AnalysisError> {
    config.validate()?;
    let n_mels = mel.n_mels();
    if config.n_coeffs > n_mels {
        return Err(AnalysisError::InvalidInput(format!(
            "n_coeffs ({}) must not exceed n_mels ({})",
            config.n_coeffs, n_mels
        )));
    }

    log::debug!(
        "Computing MFCC: {} frames, {} mel bands -> {} coefficients",
        mel.num_frames(),
        n_mels,
        config.n_coeffs
    );

    let basis = dct_basis(config.n_coeffs, n_mels);
    let coefficients = mel
        .mel_bands
        .iter()
        .map(|frame| {
            basis
                .iter()
                .map(|row| row.iter().zip(frame).map(|(b, x)| b * x).sum())
                .collect()
        })
        .collect();

    Ok(Mfcc {
        times: mel.times.clone(),
        coefficients,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mel_frames(frames: Vec<Vec<f32>>) -> MelSpectrogram {
        let n = frames.first().map(Vec::len).unwrap_or(0);
        MelSpectrogram {
            times: (0..frames.len()).map(|i| i as f32 * 0.01).collect(),
            mel_bands: frames,
            band_frequencies: (0..n).map(|i| 100.0 * (i + 1) as f32).collect(),
        }
    }

    #[test]
    fn test_constant_frame_only_dc() {
        let mel = mel_frames(vec![vec![-2.0; 16]]);
        let mfcc = compute_mfcc(&mel, &MfccConfig { n_coeffs: 5 }).unwrap();
        let c = &mfcc.coefficients[0];
        assert_eq!(c.len(), 5);
        // Orthonormal DC term: sum / sqrt(N) = -2 * 16 / 4
        assert!((c[0] + 8.0).abs() < 1e-4);
        for &v in &c[1..] {
            assert!(v.abs() < 1e-4, "non-DC coefficient of a flat frame should vanish");
        }
    }

    #[test]
    fn test_energy_preserved_with_full_basis() {
        let frame: Vec<f32> = (0..8).map(|i| (i as f32 * 0.7).sin()).collect();
        let mel = mel_frames(vec![frame.clone()]);
        let mfcc = compute_mfcc(&mel, &MfccConfig { n_coeffs: 8 }).unwrap();
        let in_energy: f32 = frame.iter().map(|x| x * x).sum();
        let out_energy: f32 = mfcc.coefficients[0].iter().map(|x| x * x).sum();
        assert!((in_energy - out_energy).abs() < 1e-4);
    }

    #[test]
    fn test_too_many_coefficients() {
        let mel = mel_frames(vec![vec![0.0; 4]]);
        assert!(compute_mfcc(&mel, &MfccConfig { n_coeffs: 13 }).is_err());
    }
}
