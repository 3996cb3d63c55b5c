//! Run requests
//!
//! A request names one target function plus the configs of every stage it may need. Missing
//! configs deserialize to their defaults, so `{"function": {"name": "onset_envelope"}}` is a
//! complete request.

use serde::{Deserialize, Serialize};

use crate::bands::model::FrequencyBand;
use crate::bands::scoped::BandMirFunction;
use crate::config::{
    ActivityConfig, BandMaskConfig, BandProposalConfig, BeatCandidateConfig, CqtConfig,
    HpssConfig, MelConfig, MfccConfig, OnsetConfig, PeakPickConfig, SpectrogramConfig,
    TempoHypothesisConfig,
};
use crate::error::AnalysisError;
use crate::features::cqt_signals::CqtSignalKind;

/// Target of a run (closed set)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "name", content = "variant", rename_all = "snake_case")]
pub enum FunctionId {
    /// Magnitude spectrogram (2D)
    Spectrogram,
    /// Log-mel spectrogram (2D)
    MelSpectrogram,
    /// Constant-Q spectrogram (2D)
    Cqt,
    /// MFCCs (2D)
    Mfcc,
    /// Spectral centroid (1D)
    SpectralCentroid,
    /// Spectral flux (1D)
    SpectralFlux,
    /// Onset envelope (1D)
    OnsetEnvelope,
    /// Windowed RMS (1D)
    AmplitudeEnvelope,
    /// CQT harmonic energy (1D)
    HarmonicEnergy,
    /// CQT bass pitch motion (1D)
    BassPitchMotion,
    /// CQT tonal stability (1D)
    TonalStability,
    /// Harmonic part of the spectrogram (2D)
    HpssHarmonic,
    /// Percussive part of the spectrogram (2D)
    HpssPercussive,
    /// Peaks of the onset envelope (events)
    OnsetPeaks,
    /// Beat candidates
    BeatCandidates,
    /// Tempo hypotheses
    TempoHypotheses,
    /// Activity signal
    Activity,
    /// Band-scoped STFT feature (needs `band`)
    BandMir1d(BandMirFunction),
    /// Band-scoped CQT signal (needs `band`)
    BandCqt1d(CqtSignalKind),
    /// Band-scoped onset peaks (needs `band`)
    BandEvents,
    /// Automatic band proposals
    BandProposals,
}

impl FunctionId {
    /// True for functions that read `RunRequest::band`
    pub fn needs_band(&self) -> bool {
        matches!(
            self,
            FunctionId::BandMir1d(_) | FunctionId::BandCqt1d(_) | FunctionId::BandEvents
        )
    }
}

/// Execution backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Everything on the CPU
    #[default]
    Cpu,
    /// Offload mel projection and HPSS masks to the accelerator when one is attached
    Gpu,
}

/// One analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// What to compute
    pub function: FunctionId,
    /// STFT framing
    #[serde(default)]
    pub spectrogram: SpectrogramConfig,
    /// Mel projection
    #[serde(default)]
    pub mel: MelConfig,
    /// CQT projection
    #[serde(default)]
    pub cqt: CqtConfig,
    /// MFCC extraction
    #[serde(default)]
    pub mfcc: MfccConfig,
    /// Activity gating
    #[serde(default)]
    pub activity: ActivityConfig,
    /// Onset envelope
    #[serde(default)]
    pub onset: OnsetConfig,
    /// Peak picking
    #[serde(default)]
    pub peak_pick: PeakPickConfig,
    /// HPSS
    #[serde(default)]
    pub hpss: HpssConfig,
    /// Beat candidates
    #[serde(default)]
    pub beat_candidates: BeatCandidateConfig,
    /// Tempo hypotheses
    #[serde(default)]
    pub tempo_hypotheses: TempoHypothesisConfig,
    /// Band for band-scoped functions
    #[serde(default)]
    pub band: Option<FrequencyBand>,
    /// Band masking
    #[serde(default)]
    pub band_mask: BandMaskConfig,
    /// Band proposals
    #[serde(default)]
    pub band_proposals: BandProposalConfig,
    /// Requested backend
    #[serde(default)]
    pub backend: Backend,
    /// Fail instead of falling back to the CPU when the accelerator is missing or fails
    #[serde(default)]
    pub strict_gpu: bool,
}

impl RunRequest {
    /// Request with default configs
    pub fn new(function: FunctionId) -> Self {
        Self {
            function,
            spectrogram: SpectrogramConfig::default(),
            mel: MelConfig::default(),
            cqt: CqtConfig::default(),
            mfcc: MfccConfig::default(),
            activity: ActivityConfig::default(),
            onset: OnsetConfig::default(),
            peak_pick: PeakPickConfig::default(),
            hpss: HpssConfig::default(),
            beat_candidates: BeatCandidateConfig::default(),
            tempo_hypotheses: TempoHypothesisConfig::default(),
            band: None,
            band_mask: BandMaskConfig::default(),
            band_proposals: BandProposalConfig::default(),
            backend: Backend::Cpu,
            strict_gpu: false,
        }
    }

    /// Same request on another backend
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Same request scoped to `band`
    pub fn with_band(mut self, band: FrequencyBand) -> Self {
        self.band = Some(band);
        self
    }

    /// Validate every config before any work starts
    ///
    /// # Errors
    ///
    /// Returns `AnalysisError::InvalidInput` for the first invalid config, or when a
    /// band-scoped function has no band.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.spectrogram.validate()?;
        self.mel.validate()?;
        self.cqt.validate()?;
        self.mfcc.validate()?;
        self.activity.validate()?;
        self.onset.validate()?;
        self.peak_pick.validate()?;
        self.hpss.validate()?;
        self.beat_candidates.validate()?;
        self.tempo_hypotheses.validate()?;
        self.band_mask.validate()?;
        self.band_proposals.validate()?;

        if self.function.needs_band() {
            match &self.band {
                Some(band) => band.validate()?,
                None => {
                    return Err(AnalysisError::InvalidInput(format!(
                        "{:?} requires a band",
                        self.function
                    )))
                }
            }
        }
        Ok(())
    }
}
