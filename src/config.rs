//! Configuration parameters for every pipeline stage
//!
//! Each stage config carries its defaults and a `validate()` method. Stages validate their
//! own config on entry and the runner validates the whole request before any work starts,
//! so configuration errors always surface as [`AnalysisError::InvalidInput`] up front.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

fn invalid(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::InvalidInput(msg.into())
}

fn ensure_finite(name: &str, value: f32) -> Result<(), AnalysisError> {
    if !value.is_finite() {
        return Err(invalid(format!("{} must be finite, got {}", name, value)));
    }
    Ok(())
}

/// Analysis window applied to every STFT frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// Periodic Hann window
    #[default]
    Hann,
}

impl FromStr for WindowKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hann" => Ok(WindowKind::Hann),
            other => Err(invalid(format!("Unsupported window type '{}'", other))),
        }
    }
}

impl fmt::Display for WindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowKind::Hann => write!(f, "hann"),
        }
    }
}

/// STFT parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrogramConfig {
    /// FFT size in samples, must be a power of two (default: 2048)
    pub fft_size: usize,

    /// Hop between frames in samples, must be `<= fft_size` (default: 512)
    pub hop_size: usize,

    /// Window type (default: Hann)
    pub window: WindowKind,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            hop_size: 512,
            window: WindowKind::Hann,
        }
    }
}

impl SpectrogramConfig {
    /// Reject non-power-of-two FFT sizes and hops larger than the frame
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(invalid(format!(
                "fft_size must be a power of two, got {}",
                self.fft_size
            )));
        }
        if self.hop_size == 0 {
            return Err(invalid("hop_size must be > 0"));
        }
        if self.hop_size > self.fft_size {
            return Err(invalid(format!(
                "hop_size ({}) must not exceed fft_size ({})",
                self.hop_size, self.fft_size
            )));
        }
        Ok(())
    }
}

/// Mel filterbank parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MelConfig {
    /// Number of mel bands (default: 64)
    pub n_mels: usize,

    /// Lowest filter edge in Hz (default: 0.0)
    pub f_min: f32,

    /// Highest filter edge in Hz. If <= 0, uses Nyquist (default: 0.0)
    pub f_max: f32,
}

impl Default for MelConfig {
    fn default() -> Self {
        Self {
            n_mels: 64,
            f_min: 0.0,
            f_max: 0.0,
        }
    }
}

impl MelConfig {
    /// Check band count and frequency bounds
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.n_mels == 0 {
            return Err(invalid("n_mels must be > 0"));
        }
        ensure_finite("f_min", self.f_min)?;
        ensure_finite("f_max", self.f_max)?;
        if self.f_min < 0.0 {
            return Err(invalid(format!("f_min must be >= 0, got {}", self.f_min)));
        }
        if self.f_max > 0.0 && self.f_max <= self.f_min {
            return Err(invalid(format!(
                "f_max ({}) must be greater than f_min ({})",
                self.f_max, self.f_min
            )));
        }
        Ok(())
    }

    /// Frequency range clamped to `[0, nyquist]`
    ///
    /// Fails when clamping collapses the range (e.g. `f_min` above Nyquist).
    pub fn resolve_range(&self, sample_rate: u32) -> Result<(f32, f32), AnalysisError> {
        let nyquist = sample_rate as f32 / 2.0;
        let f_min = self.f_min.clamp(0.0, nyquist);
        let f_max = if self.f_max <= 0.0 {
            nyquist
        } else {
            self.f_max.min(nyquist)
        };
        if f_max <= f_min {
            return Err(invalid(format!(
                "Mel range collapses after clamping to Nyquist: f_min={}, f_max={}",
                f_min, f_max
            )));
        }
        Ok((f_min, f_max))
    }
}

/// Constant-Q projection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CqtConfig {
    /// Bins per octave (default: 24)
    pub bins_per_octave: u32,

    /// Frequency of bin 0 in Hz (default: 32.70, C1)
    pub f_min: f32,

    /// Highest bin frequency in Hz, clamped to Nyquist (default: 8000.0)
    pub f_max: f32,

    /// Hop size in samples. `None` uses `fft_size / 4` (default: None)
    pub hop_size: Option<usize>,
}

impl Default for CqtConfig {
    fn default() -> Self {
        Self {
            bins_per_octave: 24,
            f_min: 32.70,
            f_max: 8000.0,
            hop_size: None,
        }
    }
}

impl CqtConfig {
    /// Check resolution and frequency bounds
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.bins_per_octave == 0 {
            return Err(invalid("bins_per_octave must be > 0"));
        }
        ensure_finite("f_min", self.f_min)?;
        ensure_finite("f_max", self.f_max)?;
        if self.f_min <= 0.0 {
            return Err(invalid(format!("CQT f_min must be > 0, got {}", self.f_min)));
        }
        if self.f_max <= self.f_min {
            return Err(invalid(format!(
                "f_max ({}) must be greater than f_min ({})",
                self.f_max, self.f_min
            )));
        }
        if self.hop_size == Some(0) {
            return Err(invalid("CQT hop_size must be > 0"));
        }
        Ok(())
    }
}

/// MFCC parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MfccConfig {
    /// Number of cepstral coefficients kept per frame (default: 13)
    pub n_coeffs: usize,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self { n_coeffs: 13 }
    }
}

impl MfccConfig {
    /// Check the coefficient count
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.n_coeffs == 0 {
            return Err(invalid("n_coeffs must be > 0"));
        }
        Ok(())
    }
}

/// Activity / silence gating parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Percentile (0.0-1.0) of frame energy used as the noise floor (default: 0.1)
    pub noise_floor_percentile: f32,

    /// dB above the noise floor required to enter ACTIVE (default: 10.0)
    pub enter_margin_db: f32,

    /// dB above the noise floor required to stay ACTIVE (default: 6.0)
    pub exit_margin_db: f32,

    /// Thresholds never drop below this level in dB (default: -60.0)
    pub absolute_floor_db: f32,

    /// Frames below the exit threshold tolerated before leaving ACTIVE, in ms (default: 100.0)
    pub hangover_ms: f32,

    /// Active regions shorter than this are treated as blips, in ms (default: 30.0)
    pub min_active_ms: f32,

    /// Span after each INACTIVE→ACTIVE transition marked in the suppress mask, in ms
    /// (default: 50.0)
    pub suppress_ms: f32,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            noise_floor_percentile: 0.1,
            enter_margin_db: 10.0,
            exit_margin_db: 6.0,
            absolute_floor_db: -60.0,
            hangover_ms: 100.0,
            min_active_ms: 30.0,
            suppress_ms: 50.0,
        }
    }
}

impl ActivityConfig {
    /// Check percentile range and hysteresis ordering
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(0.0..=1.0).contains(&self.noise_floor_percentile) {
            return Err(invalid(format!(
                "noise_floor_percentile must be in [0.0, 1.0], got {}",
                self.noise_floor_percentile
            )));
        }
        ensure_finite("enter_margin_db", self.enter_margin_db)?;
        ensure_finite("exit_margin_db", self.exit_margin_db)?;
        ensure_finite("absolute_floor_db", self.absolute_floor_db)?;
        if self.exit_margin_db < 0.0 || self.enter_margin_db < self.exit_margin_db {
            return Err(invalid(format!(
                "Hysteresis margins must satisfy enter >= exit >= 0 (enter={}, exit={})",
                self.enter_margin_db, self.exit_margin_db
            )));
        }
        for (name, value) in [
            ("hangover_ms", self.hangover_ms),
            ("min_active_ms", self.min_active_ms),
            ("suppress_ms", self.suppress_ms),
        ] {
            ensure_finite(name, value)?;
            if value < 0.0 {
                return Err(invalid(format!("{} must be >= 0, got {}", name, value)));
            }
        }
        Ok(())
    }
}

/// Input representation for the onset envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetSource {
    /// Log-mel bands
    #[default]
    Mel,
    /// Linear STFT magnitudes
    Spectrogram,
}

/// Temporal difference applied per bin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnsetDifference {
    /// Only increases count (half-wave rectified)
    #[default]
    Rectified,
    /// Increases and decreases count
    Absolute,
}

/// Onset envelope parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Which representation the envelope is computed from (default: Mel)
    pub source: OnsetSource,

    /// Log-compress linear magnitudes before differencing; mel input is already log
    /// (default: true)
    pub log_compress: bool,

    /// Difference mode (default: Rectified)
    pub difference: OnsetDifference,

    /// Bins whose linear level is below this fraction of the frame maximum are excluded
    /// from the average. 0 disables bin gating (default: 0.0)
    pub bin_floor_ratio: f32,

    /// Zero the envelope on inactive and suppressed frames (default: true)
    pub silence_gate: bool,

    /// Centered moving-average window in ms. 0 disables smoothing (default: 30.0)
    pub smooth_ms: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            source: OnsetSource::Mel,
            log_compress: true,
            difference: OnsetDifference::Rectified,
            bin_floor_ratio: 0.0,
            silence_gate: true,
            smooth_ms: 30.0,
        }
    }
}

impl OnsetConfig {
    /// Check gating ratio and smoothing window
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(0.0..1.0).contains(&self.bin_floor_ratio) {
            return Err(invalid(format!(
                "bin_floor_ratio must be in [0.0, 1.0), got {}",
                self.bin_floor_ratio
            )));
        }
        ensure_finite("smooth_ms", self.smooth_ms)?;
        if self.smooth_ms < 0.0 {
            return Err(invalid("smooth_ms must be >= 0"));
        }
        Ok(())
    }
}

/// Peak picking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakPickConfig {
    /// Threshold is `mean + adaptive_factor * std` (default: 1.0)
    pub adaptive_factor: f32,

    /// Minimum time between accepted peaks in seconds (default: 0.1)
    pub min_interval_sec: f32,
}

impl Default for PeakPickConfig {
    fn default() -> Self {
        Self {
            adaptive_factor: 1.0,
            min_interval_sec: 0.1,
        }
    }
}

impl PeakPickConfig {
    /// Check threshold factor and interval
    pub fn validate(&self) -> Result<(), AnalysisError> {
        ensure_finite("adaptive_factor", self.adaptive_factor)?;
        ensure_finite("min_interval_sec", self.min_interval_sec)?;
        if self.min_interval_sec < 0.0 {
            return Err(invalid("min_interval_sec must be >= 0"));
        }
        Ok(())
    }
}

/// HPSS mask type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HpssMaskKind {
    /// Wiener-style soft masks `H^p / (H^p + P^p)`
    #[default]
    Soft,
    /// Binary masks, harmonic wins when `H > margin * P`
    Hard,
}

/// Harmonic/percussive separation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HpssConfig {
    /// Median window across time in frames, forced odd (default: 17)
    pub harmonic_kernel: usize,

    /// Median window across frequency in bins, forced odd (default: 17)
    pub percussive_kernel: usize,

    /// Mask type (default: Soft)
    pub mask: HpssMaskKind,

    /// Soft-mask exponent (default: 2.0)
    pub power: f32,

    /// Hard-mask separation margin, >= 1 (default: 1.0)
    pub margin: f32,
}

impl Default for HpssConfig {
    fn default() -> Self {
        Self {
            harmonic_kernel: 17,
            percussive_kernel: 17,
            mask: HpssMaskKind::Soft,
            power: 2.0,
            margin: 1.0,
        }
    }
}

impl HpssConfig {
    /// Check kernel sizes and mask parameters
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.harmonic_kernel == 0 || self.percussive_kernel == 0 {
            return Err(invalid("HPSS kernel sizes must be > 0"));
        }
        ensure_finite("power", self.power)?;
        ensure_finite("margin", self.margin)?;
        if self.power <= 0.0 {
            return Err(invalid("HPSS power must be > 0"));
        }
        if self.margin < 1.0 {
            return Err(invalid("HPSS margin must be >= 1.0"));
        }
        Ok(())
    }
}

/// Beat-candidate salience parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatCandidateConfig {
    /// Weight of the z-scored onset envelope (default: 0.7)
    pub onset_weight: f32,

    /// Weight of the z-scored spectral flux (default: 0.3)
    pub flux_weight: f32,

    /// Salience smoothing window in ms (default: 50.0)
    pub smooth_ms: f32,

    /// Relaxed peak threshold factor (default: 0.25)
    pub adaptive_factor: f32,

    /// Minimum time between candidates in seconds (default: 0.15)
    pub min_interval_sec: f32,
}

impl Default for BeatCandidateConfig {
    fn default() -> Self {
        Self {
            onset_weight: 0.7,
            flux_weight: 0.3,
            smooth_ms: 50.0,
            adaptive_factor: 0.25,
            min_interval_sec: 0.15,
        }
    }
}

impl BeatCandidateConfig {
    /// Check weights and peak parameters
    pub fn validate(&self) -> Result<(), AnalysisError> {
        ensure_finite("onset_weight", self.onset_weight)?;
        ensure_finite("flux_weight", self.flux_weight)?;
        if self.onset_weight < 0.0 || self.flux_weight < 0.0 {
            return Err(invalid("Salience weights must be >= 0"));
        }
        if self.onset_weight + self.flux_weight <= 0.0 {
            return Err(invalid("At least one salience weight must be > 0"));
        }
        ensure_finite("smooth_ms", self.smooth_ms)?;
        if self.smooth_ms < 0.0 {
            return Err(invalid("smooth_ms must be >= 0"));
        }
        PeakPickConfig {
            adaptive_factor: self.adaptive_factor,
            min_interval_sec: self.min_interval_sec,
        }
        .validate()
    }
}

/// Tempo histogram parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoHypothesisConfig {
    /// Minimum BPM to consider (default: 60.0)
    pub min_bpm: f32,

    /// Maximum BPM to consider (default: 180.0)
    pub max_bpm: f32,

    /// Histogram bin width in BPM (default: 1.0)
    pub bin_size_bpm: f32,

    /// Peaks below `min_confidence * max_count` are dropped (default: 0.1)
    pub min_confidence: f32,

    /// Maximum number of hypotheses returned (default: 10)
    pub max_hypotheses: usize,

    /// Weight each interval by the geometric mean of its candidates' strengths
    /// (default: true)
    pub weight_by_strength: bool,

    /// Relative tolerance for harmonic family ratios (default: 0.03)
    pub family_tolerance: f32,
}

impl Default for TempoHypothesisConfig {
    fn default() -> Self {
        Self {
            min_bpm: 60.0,
            max_bpm: 180.0,
            bin_size_bpm: 1.0,
            min_confidence: 0.1,
            max_hypotheses: 10,
            weight_by_strength: true,
            family_tolerance: 0.03,
        }
    }
}

impl TempoHypothesisConfig {
    /// Check BPM range and histogram resolution
    pub fn validate(&self) -> Result<(), AnalysisError> {
        ensure_finite("min_bpm", self.min_bpm)?;
        ensure_finite("max_bpm", self.max_bpm)?;
        ensure_finite("bin_size_bpm", self.bin_size_bpm)?;
        if self.min_bpm <= 0.0 || self.max_bpm <= self.min_bpm {
            return Err(invalid(format!(
                "BPM range must satisfy 0 < min_bpm < max_bpm (got {}..{})",
                self.min_bpm, self.max_bpm
            )));
        }
        if self.bin_size_bpm <= 0.0 {
            return Err(invalid("bin_size_bpm must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence must be in [0.0, 1.0]"));
        }
        if self.max_hypotheses == 0 {
            return Err(invalid("max_hypotheses must be > 0"));
        }
        if !(0.0..0.5).contains(&self.family_tolerance) {
            return Err(invalid("family_tolerance must be in [0.0, 0.5)"));
        }
        Ok(())
    }
}

/// Phase alignment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseAlignmentConfig {
    /// Number of candidate offsets spanning one beat period (default: 32)
    pub phase_resolution: usize,

    /// Maximum distance in seconds between a candidate and its grid line (default: 0.07)
    pub match_tolerance: f32,

    /// Score penalty per unit of `avg_offset_error / match_tolerance` (default: 0.5)
    pub error_penalty: f32,

    /// Number of phase hypotheses returned (default: 3)
    pub top_k: usize,
}

impl Default for PhaseAlignmentConfig {
    fn default() -> Self {
        Self {
            phase_resolution: 32,
            match_tolerance: 0.07,
            error_penalty: 0.5,
            top_k: 3,
        }
    }
}

impl PhaseAlignmentConfig {
    /// Check resolution, tolerance and penalty
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.phase_resolution == 0 {
            return Err(invalid("phase_resolution must be > 0"));
        }
        ensure_finite("match_tolerance", self.match_tolerance)?;
        if self.match_tolerance <= 0.0 {
            return Err(invalid("match_tolerance must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.error_penalty) {
            return Err(invalid("error_penalty must be in [0.0, 1.0]"));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k must be > 0"));
        }
        Ok(())
    }
}

/// Band masking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandMaskConfig {
    /// Raised-cosine taper width outside the band edges on the FFT axis, in Hz
    /// (default: 0.0, hard edges)
    pub edge_smooth_hz: f32,

    /// Raised-cosine taper width outside the band edges on the CQT axis, in bins
    /// (default: 0.0, hard edges)
    pub edge_smooth_bins: f32,

    /// Frames retaining less than this energy fraction count as weak (default: 0.1)
    pub weak_retention_threshold: f32,
}

impl Default for BandMaskConfig {
    fn default() -> Self {
        Self {
            edge_smooth_hz: 0.0,
            edge_smooth_bins: 0.0,
            weak_retention_threshold: 0.1,
        }
    }
}

impl BandMaskConfig {
    /// Check taper widths and the weak-frame threshold
    pub fn validate(&self) -> Result<(), AnalysisError> {
        ensure_finite("edge_smooth_hz", self.edge_smooth_hz)?;
        ensure_finite("edge_smooth_bins", self.edge_smooth_bins)?;
        if self.edge_smooth_hz < 0.0 || self.edge_smooth_bins < 0.0 {
            return Err(invalid("Edge smoothing widths must be >= 0"));
        }
        if !(0.0..=1.0).contains(&self.weak_retention_threshold) {
            return Err(invalid("weak_retention_threshold must be in [0.0, 1.0]"));
        }
        Ok(())
    }
}

/// Band proposal parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandProposalConfig {
    /// Mel bands used for the long-term spectrum (default: 48)
    pub n_mels: usize,

    /// Maximum number of proposed bands (default: 4)
    pub max_proposals: usize,

    /// Proposals holding less than this share of total energy are dropped (default: 0.05)
    pub min_salience: f32,
}

impl Default for BandProposalConfig {
    fn default() -> Self {
        Self {
            n_mels: 48,
            max_proposals: 4,
            min_salience: 0.05,
        }
    }
}

impl BandProposalConfig {
    /// Check band count and limits
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.n_mels < 3 {
            return Err(invalid("Band proposals need at least 3 mel bands"));
        }
        if self.max_proposals == 0 {
            return Err(invalid("max_proposals must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.min_salience) {
            return Err(invalid("min_salience must be in [0.0, 1.0]"));
        }
        Ok(())
    }
}
