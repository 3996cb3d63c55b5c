//! Run orchestration
//!
//! The runner validates the request, then computes only the stages the target function
//! depends on:
//!
//! ```text
//! audio -> mono -> spectrogram -> mel -> onset ----> peaks / beat candidates -> tempo
//!                      |    \--> activity --/
//!                      |--> HPSS, centroid, flux, bands
//! mono -> CQT -> CQT signals, CQT bands
//! ```
//!
//! Mel projection and HPSS masks go through the attached accelerator when the request asks
//! for the GPU backend. Accelerator errors and malformed accelerator output fall back to the
//! CPU path with a warning, or fail the run with `GpuError` when `strict_gpu` is set.

use std::time::{Duration, Instant};

use crate::analysis::accelerator::{Accelerator, GpuContext};
use crate::analysis::request::{Backend, FunctionId, RunRequest};
use crate::analysis::result::{RunMeta, RunOutput, RunResult, Timings};
use crate::bands::model::FrequencyBand;
use crate::bands::proposals::propose_bands;
use crate::bands::scoped::{band_cqt_1d, band_events, band_mir_1d, BandAnalysisConfig};
use crate::cancel::CancellationToken;
use crate::config::OnsetSource;
use crate::error::AnalysisError;
use crate::events::beat_candidates::{detect_beat_candidates, BeatCandidateResult};
use crate::events::peak_picking::pick_peaks;
use crate::features::cqt_signals::{cqt_signal, CqtSignalKind};
use crate::features::hpss::{apply_hpss_masks, estimate_hpss_masks, HpssMasks, HpssResult};
use crate::features::onset::{amplitude_envelope, onset_envelope, OnsetInput};
use crate::features::spectral::{spectral_centroid, spectral_flux, InactiveMode};
use crate::features::{Matrix2D, Signal1D};
use crate::preprocessing::activity::{compute_activity, ActivitySignal};
use crate::preprocessing::channel_mixer::{mix_to_mono, AudioSource};
use crate::spectrum::cqt::{compute_cqt, CqtSpectrogram};
use crate::spectrum::mel::{compute_mel_spectrogram, MelFilterbank, MelSpectrogram};
use crate::spectrum::mfcc::compute_mfcc;
use crate::spectrum::stft::{compute_spectrogram, Spectrogram};

/// Source id given to proposals when the request carries no band
const DEFAULT_SOURCE_ID: &str = "mix";

/// Executes run requests, optionally with an accelerator attached
#[derive(Debug, Clone, Default)]
pub struct AnalysisRunner {
    gpu: Option<GpuContext>,
}

impl AnalysisRunner {
    /// CPU-only runner
    pub fn new() -> Self {
        Self { gpu: None }
    }

    /// Runner that offloads to `gpu` for requests on the GPU backend
    pub fn with_gpu(gpu: GpuContext) -> Self {
        Self { gpu: Some(gpu) }
    }

    /// True when an accelerator is attached
    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    /// Run one request against `audio`
    ///
    /// # Arguments
    ///
    /// * `audio` - Decoded PCM (mixed to mono first)
    /// * `request` - Target function and stage configs
    /// * `cancel` - Polled inside every expensive loop
    ///
    /// # Returns
    ///
    /// The output wrapped with backend and timing metadata
    ///
    /// # Errors
    ///
    /// - `AnalysisError::InvalidInput` for invalid configs, a missing band, or unusable audio
    /// - `AnalysisError::Cancelled` if the token fires
    /// - `AnalysisError::GpuError` only when `strict_gpu` is set
    pub fn run(
        &self,
        audio: &dyn AudioSource,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, AnalysisError> {
        let started = Instant::now();
        request.validate()?;

        log::debug!(
            "Running {:?} on {:?} backend ({} Hz, {} channels, {:.2}s)",
            request.function,
            request.backend,
            audio.sample_rate(),
            audio.number_of_channels(),
            audio.duration_seconds()
        );

        let accelerator = match (request.backend, &self.gpu) {
            (Backend::Cpu, _) => None,
            (Backend::Gpu, Some(ctx)) => Some(ctx.accelerator()),
            (Backend::Gpu, None) if request.strict_gpu => {
                return Err(AnalysisError::GpuError(
                    "GPU backend requested but no GPU context is attached".to_string(),
                ))
            }
            (Backend::Gpu, None) => {
                log::warn!("GPU backend requested without a GPU context, running on CPU");
                None
            }
        };

        cancel.check()?;
        let samples = mix_to_mono(audio)?;
        let mut stages = Stages {
            request,
            cancel,
            accelerator,
            samples,
            sample_rate: audio.sample_rate(),
            used_gpu: false,
            gpu_time: Duration::ZERO,
        };
        let output = stages.compute(request.function)?;

        let total = started.elapsed();
        let mut meta = RunMeta::new(request.backend);
        meta.used_gpu = stages.used_gpu;
        meta.timings = Timings {
            total_ms: total.as_secs_f64() * 1000.0,
            cpu_ms: total.saturating_sub(stages.gpu_time).as_secs_f64() * 1000.0,
            gpu_ms: stages.gpu_time.as_secs_f64() * 1000.0,
        };

        log::debug!(
            "{:?} finished in {:.1} ms ({}, used_gpu={})",
            request.function,
            meta.timings.total_ms,
            output.kind(),
            meta.used_gpu
        );

        Ok(RunResult { meta, output })
    }
}

/// Run `request` on the CPU
///
/// # Example
///
/// ```
/// use spectral_mir::analysis::{run_analysis, FunctionId, RunOutput, RunRequest};
/// use spectral_mir::cancel::CancellationToken;
/// use spectral_mir::preprocessing::PcmBuffer;
///
/// let samples: Vec<f32> = (0..22050)
///     .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 22050.0).sin() * 0.5)
///     .collect();
/// let audio = PcmBuffer::mono(22050, samples);
///
/// let result = run_analysis(
///     &audio,
///     &RunRequest::new(FunctionId::SpectralCentroid),
///     &CancellationToken::none(),
/// )?;
/// assert!(!result.meta.used_gpu);
/// assert!(matches!(result.output, RunOutput::OneD(_)));
/// # Ok::<(), spectral_mir::AnalysisError>(())
/// ```
pub fn run_analysis(
    audio: &dyn AudioSource,
    request: &RunRequest,
    cancel: &CancellationToken,
) -> Result<RunResult, AnalysisError> {
    AnalysisRunner::new().run(audio, request, cancel)
}

/// Per-run state: inputs, the resolved accelerator and its bookkeeping
struct Stages<'a> {
    request: &'a RunRequest,
    cancel: &'a CancellationToken,
    accelerator: Option<&'a dyn Accelerator>,
    samples: Vec<f32>,
    sample_rate: u32,
    used_gpu: bool,
    gpu_time: Duration,
}

impl Stages<'_> {
    fn compute(&mut self, function: FunctionId) -> Result<RunOutput, AnalysisError> {
        let output = match function {
            FunctionId::Spectrogram => RunOutput::TwoD(Matrix2D::from(&self.spectrogram()?)),
            FunctionId::MelSpectrogram => {
                let spec = self.spectrogram()?;
                RunOutput::TwoD(Matrix2D::from(&self.mel(&spec)?))
            }
            FunctionId::Cqt => RunOutput::TwoD(Matrix2D::from(&self.cqt()?)),
            FunctionId::Mfcc => {
                let spec = self.spectrogram()?;
                let mel = self.mel(&spec)?;
                RunOutput::TwoD(Matrix2D::from(&compute_mfcc(&mel, &self.request.mfcc)?))
            }
            FunctionId::SpectralCentroid => {
                let spec = self.spectrogram()?;
                let activity = self.activity(&spec)?;
                RunOutput::OneD(spectral_centroid(&spec, Some(&activity), InactiveMode::Zero))
            }
            FunctionId::SpectralFlux => {
                let spec = self.spectrogram()?;
                let activity = self.activity(&spec)?;
                RunOutput::OneD(spectral_flux(&spec, Some(&activity)))
            }
            FunctionId::OnsetEnvelope => {
                let spec = self.spectrogram()?;
                let activity = self.activity(&spec)?;
                RunOutput::OneD(self.onset(&spec, &activity)?)
            }
            FunctionId::AmplitudeEnvelope => RunOutput::OneD(amplitude_envelope(
                &self.samples,
                self.sample_rate,
                self.request.spectrogram.fft_size,
                self.request.spectrogram.hop_size,
            )?),
            FunctionId::HarmonicEnergy => self.cqt_signal(CqtSignalKind::HarmonicEnergy)?,
            FunctionId::BassPitchMotion => self.cqt_signal(CqtSignalKind::BassPitchMotion)?,
            FunctionId::TonalStability => self.cqt_signal(CqtSignalKind::TonalStability)?,
            FunctionId::HpssHarmonic => {
                let spec = self.spectrogram()?;
                RunOutput::TwoD(Matrix2D::from(&self.hpss(&spec)?.harmonic))
            }
            FunctionId::HpssPercussive => {
                let spec = self.spectrogram()?;
                RunOutput::TwoD(Matrix2D::from(&self.hpss(&spec)?.percussive))
            }
            FunctionId::OnsetPeaks => {
                let spec = self.spectrogram()?;
                let activity = self.activity(&spec)?;
                let onset = self.onset(&spec, &activity)?;
                RunOutput::Events(pick_peaks(&onset, &self.request.peak_pick)?)
            }
            FunctionId::BeatCandidates => RunOutput::BeatCandidates(self.beat_candidates()?),
            FunctionId::TempoHypotheses => {
                let candidates = self.beat_candidates()?;
                RunOutput::TempoHypotheses(crate::tempo::generate_tempo_hypotheses(
                    &candidates.candidates,
                    &self.request.tempo_hypotheses,
                )?)
            }
            FunctionId::Activity => {
                let spec = self.spectrogram()?;
                RunOutput::Activity(self.activity(&spec)?)
            }
            FunctionId::BandMir1d(function) => {
                let band = self.band()?;
                let spec = self.spectrogram()?;
                RunOutput::BandMir1d(band_mir_1d(&spec, band, function, &self.band_config())?)
            }
            FunctionId::BandCqt1d(kind) => {
                let band = self.band()?;
                let cqt = self.cqt()?;
                RunOutput::BandCqt1d(band_cqt_1d(&cqt, band, kind, &self.request.band_mask)?)
            }
            FunctionId::BandEvents => {
                let band = self.band()?;
                let spec = self.spectrogram()?;
                RunOutput::BandEvents(band_events(&spec, band, &self.band_config())?)
            }
            FunctionId::BandProposals => {
                let spec = self.spectrogram()?;
                let source_id = self
                    .request
                    .band
                    .as_ref()
                    .map(|b| b.source_id.as_str())
                    .unwrap_or(DEFAULT_SOURCE_ID);
                RunOutput::BandProposals(propose_bands(
                    &spec,
                    source_id,
                    &self.request.band_proposals,
                )?)
            }
        };
        self.cancel.check()?;
        Ok(output)
    }

    fn band(&self) -> Result<&FrequencyBand, AnalysisError> {
        self.request.band.as_ref().ok_or_else(|| {
            AnalysisError::InvalidInput(format!("{:?} requires a band", self.request.function))
        })
    }

    fn band_config(&self) -> BandAnalysisConfig {
        BandAnalysisConfig {
            mask: self.request.band_mask.clone(),
            activity: self.request.activity.clone(),
            onset: self.request.onset.clone(),
            mel: self.request.mel.clone(),
            peak_pick: self.request.peak_pick.clone(),
        }
    }

    fn spectrogram(&self) -> Result<Spectrogram, AnalysisError> {
        compute_spectrogram(
            &self.samples,
            self.sample_rate,
            &self.request.spectrogram,
            self.cancel,
        )
    }

    fn cqt(&self) -> Result<CqtSpectrogram, AnalysisError> {
        compute_cqt(&self.samples, self.sample_rate, &self.request.cqt, self.cancel)
    }

    fn cqt_signal(&self, kind: CqtSignalKind) -> Result<RunOutput, AnalysisError> {
        Ok(RunOutput::OneD(cqt_signal(&self.cqt()?, kind)))
    }

    fn activity(&self, spec: &Spectrogram) -> Result<ActivitySignal, AnalysisError> {
        compute_activity(spec, &self.request.activity)
    }

    fn onset(
        &mut self,
        spec: &Spectrogram,
        activity: &ActivitySignal,
    ) -> Result<Signal1D, AnalysisError> {
        match self.request.onset.source {
            OnsetSource::Mel => {
                let mel = self.mel(spec)?;
                onset_envelope(OnsetInput::Mel(&mel), &self.request.onset, Some(activity))
            }
            OnsetSource::Spectrogram => {
                onset_envelope(OnsetInput::Spectrogram(spec), &self.request.onset, Some(activity))
            }
        }
    }

    fn beat_candidates(&mut self) -> Result<BeatCandidateResult, AnalysisError> {
        let spec = self.spectrogram()?;
        let activity = self.activity(&spec)?;
        let onset = self.onset(&spec, &activity)?;
        let flux = spectral_flux(&spec, Some(&activity));
        detect_beat_candidates(&onset, &flux, &self.request.beat_candidates)
    }

    fn mel(&mut self, spec: &Spectrogram) -> Result<MelSpectrogram, AnalysisError> {
        let Some(accelerator) = self.accelerator else {
            return compute_mel_spectrogram(spec, &self.request.mel);
        };

        let bank = MelFilterbank::new(&self.request.mel, spec.fft_size, spec.sample_rate)?;
        let started = Instant::now();
        let attempt = accelerator
            .mel_project(&spec.magnitudes, &bank)
            .and_then(|projected| {
                check_frames(&projected, spec.num_frames(), bank.n_mels(), "mel projection")?;
                Ok(projected)
            });
        self.gpu_time += started.elapsed();

        match attempt {
            Ok(projected) => {
                self.used_gpu = true;
                Ok(MelSpectrogram::from_projected(
                    spec.times.clone(),
                    projected,
                    bank.center_frequencies.clone(),
                ))
            }
            Err(e) => {
                self.fallback(accelerator, "mel projection", e)?;
                self.cancel.check()?;
                compute_mel_spectrogram(spec, &self.request.mel)
            }
        }
    }

    fn hpss(&mut self, spec: &Spectrogram) -> Result<HpssResult, AnalysisError> {
        let masks = match self.accelerator {
            Some(accelerator) => {
                let started = Instant::now();
                let attempt = accelerator
                    .hpss_masks(&spec.magnitudes, &self.request.hpss)
                    .and_then(|masks| {
                        check_masks(&masks, spec)?;
                        Ok(masks)
                    });
                self.gpu_time += started.elapsed();
                match attempt {
                    Ok(masks) => {
                        self.used_gpu = true;
                        masks
                    }
                    Err(e) => {
                        self.fallback(accelerator, "HPSS masks", e)?;
                        estimate_hpss_masks(&spec.magnitudes, &self.request.hpss, self.cancel)?
                    }
                }
            }
            None => estimate_hpss_masks(&spec.magnitudes, &self.request.hpss, self.cancel)?,
        };
        apply_hpss_masks(spec, &masks, self.cancel)
    }

    /// Log and swallow an accelerator failure, or escalate it under `strict_gpu`
    fn fallback(
        &self,
        accelerator: &dyn Accelerator,
        stage: &str,
        error: AnalysisError,
    ) -> Result<(), AnalysisError> {
        if self.request.strict_gpu {
            return Err(match error {
                AnalysisError::GpuError(_) => error,
                other => AnalysisError::GpuError(format!(
                    "{} failed on '{}': {}",
                    stage,
                    accelerator.name(),
                    other
                )),
            });
        }
        log::warn!(
            "Accelerator '{}' failed during {} ({}), falling back to CPU",
            accelerator.name(),
            stage,
            error
        );
        Ok(())
    }
}

fn check_frames(
    frames: &[Vec<f32>],
    num_frames: usize,
    num_bins: usize,
    stage: &str,
) -> Result<(), AnalysisError> {
    if frames.len() != num_frames || frames.iter().any(|f| f.len() != num_bins) {
        return Err(AnalysisError::GpuError(format!(
            "{} returned the wrong shape (expected {} x {})",
            stage, num_frames, num_bins
        )));
    }
    if frames.iter().flatten().any(|v| !v.is_finite()) {
        return Err(AnalysisError::GpuError(format!(
            "{} returned non-finite values",
            stage
        )));
    }
    Ok(())
}

fn check_masks(masks: &HpssMasks, spec: &Spectrogram) -> Result<(), AnalysisError> {
    for mask in [&masks.harmonic, &masks.percussive] {
        check_frames(mask, spec.num_frames(), spec.num_bins(), "HPSS masks")?;
        if mask.iter().flatten().any(|&v| !(0.0..=1.0).contains(&v)) {
            return Err(AnalysisError::GpuError(
                "HPSS masks fall outside [0, 1]".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::accelerator::EmulatedAccelerator;
    use crate::config::HpssConfig;
    use crate::preprocessing::channel_mixer::PcmBuffer;
    use std::f32::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct BrokenAccelerator;

    impl Accelerator for BrokenAccelerator {
        fn name(&self) -> &str {
            "broken"
        }

        fn mel_project(
            &self,
            _frames: &[Vec<f32>],
            _filterbank: &MelFilterbank,
        ) -> Result<Vec<Vec<f32>>, AnalysisError> {
            Err(AnalysisError::GpuError("device lost".to_string()))
        }

        fn hpss_masks(
            &self,
            frames: &[Vec<f32>],
            _config: &HpssConfig,
        ) -> Result<HpssMasks, AnalysisError> {
            // Wrong shape
            Ok(HpssMasks {
                harmonic: vec![vec![0.5; 3]; frames.len()],
                percussive: vec![vec![0.5; 3]; frames.len()],
            })
        }
    }

    fn tone(seconds: f32) -> PcmBuffer {
        let sr = 22050;
        let samples = (0..(seconds * sr as f32) as usize)
            .map(|i| 0.5 * (2.0 * PI * 440.0 * i as f32 / sr as f32).sin())
            .collect();
        PcmBuffer::mono(sr, samples)
    }

    #[test]
    fn test_cpu_run_meta() {
        let result = run_analysis(
            &tone(1.0),
            &RunRequest::new(FunctionId::MelSpectrogram),
            &CancellationToken::none(),
        )
        .unwrap();
        assert_eq!(result.meta.backend, Backend::Cpu);
        assert!(!result.meta.used_gpu);
        assert_eq!(result.meta.timings.gpu_ms, 0.0);
        assert!(result.meta.timings.total_ms >= result.meta.timings.cpu_ms);
        let m = result.output.as_matrix().unwrap();
        assert_eq!(m.num_bins(), 64);
    }

    #[test]
    fn test_emulated_gpu_matches_cpu_mel() {
        let audio = tone(1.0);
        let cpu = run_analysis(
            &audio,
            &RunRequest::new(FunctionId::MelSpectrogram),
            &CancellationToken::none(),
        )
        .unwrap();
        let runner = AnalysisRunner::with_gpu(GpuContext::new(Arc::new(EmulatedAccelerator)));
        let gpu = runner
            .run(
                &audio,
                &RunRequest::new(FunctionId::MelSpectrogram).with_backend(Backend::Gpu),
                &CancellationToken::none(),
            )
            .unwrap();
        assert!(gpu.meta.used_gpu);
        assert_eq!(gpu.output, cpu.output);
    }

    #[test]
    fn test_gpu_failure_falls_back() {
        let runner = AnalysisRunner::with_gpu(GpuContext::new(Arc::new(BrokenAccelerator)));
        let request = RunRequest::new(FunctionId::MelSpectrogram).with_backend(Backend::Gpu);
        let result = runner
            .run(&tone(0.5), &request, &CancellationToken::none())
            .unwrap();
        assert!(!result.meta.used_gpu);

        let strict = RunRequest {
            strict_gpu: true,
            ..request
        };
        let err = runner
            .run(&tone(0.5), &strict, &CancellationToken::none())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::GpuError(_)));
    }

    #[test]
    fn test_malformed_masks_fall_back() {
        let runner = AnalysisRunner::with_gpu(GpuContext::new(Arc::new(BrokenAccelerator)));
        let request = RunRequest::new(FunctionId::HpssHarmonic).with_backend(Backend::Gpu);
        let result = runner
            .run(&tone(0.5), &request, &CancellationToken::none())
            .unwrap();
        assert!(!result.meta.used_gpu);
        assert_eq!(result.output.as_matrix().unwrap().num_bins(), 1025);
    }

    #[test]
    fn test_gpu_without_context() {
        let request = RunRequest::new(FunctionId::Spectrogram).with_backend(Backend::Gpu);
        let result = run_analysis(&tone(0.5), &request, &CancellationToken::none()).unwrap();
        assert_eq!(result.meta.backend, Backend::Gpu);
        assert!(!result.meta.used_gpu);

        let strict = RunRequest {
            strict_gpu: true,
            ..request
        };
        assert!(matches!(
            run_analysis(&tone(0.5), &strict, &CancellationToken::none()),
            Err(AnalysisError::GpuError(_))
        ));
    }

    #[test]
    fn test_cancellation_aborts_run() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let cancel = CancellationToken::from_fn(move || counter.fetch_add(1, Ordering::Relaxed) >= 5);
        let result = run_analysis(&tone(1.0), &RunRequest::new(FunctionId::Spectrogram), &cancel);
        assert!(result.unwrap_err().is_cancelled());
    }

    #[test]
    fn test_band_function_requires_band() {
        let request = RunRequest::new(FunctionId::BandEvents);
        assert!(matches!(
            run_analysis(&tone(0.5), &request, &CancellationToken::none()),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_tempo_chain_runs() {
        // Sustained tone keeps every frame active; bursts every 0.5 s carry the pulse
        let sr = 22050usize;
        let mut samples: Vec<f32> = (0..sr * 6)
            .map(|i| 0.3 * (2.0 * PI * 220.0 * i as f32 / sr as f32).sin())
            .collect();
        for beat in 0..12 {
            let start = beat * sr / 2;
            for i in 0..1200 {
                let decay = (-(i as f32) / 200.0).exp();
                samples[start + i] += 0.6 * decay * (2.0 * PI * 2000.0 * i as f32 / sr as f32).sin();
            }
        }
        let audio = PcmBuffer::mono(sr as u32, samples);
        let result = run_analysis(
            &audio,
            &RunRequest::new(FunctionId::TempoHypotheses),
            &CancellationToken::none(),
        )
        .unwrap();
        match result.output {
            RunOutput::TempoHypotheses(t) => {
                assert!(
                    t.hypotheses.iter().any(|h| (h.bpm - 120.0).abs() < 3.0),
                    "no hypothesis near 120 BPM: {:?}",
                    t.hypotheses.iter().map(|h| h.bpm).collect::<Vec<_>>()
                );
            }
            other => panic!("unexpected output {}", other.kind()),
        }
    }
}
