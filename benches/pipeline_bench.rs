//! Performance benchmarks for the analysis pipeline

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use spectral_mir::cancel::CancellationToken;
use spectral_mir::config::{MelConfig, SpectrogramConfig, TempoHypothesisConfig};
use spectral_mir::events::CandidateSource;
use spectral_mir::spectrum::{compute_mel_spectrogram, compute_spectrogram};
use spectral_mir::tempo::generate_tempo_hypotheses;
use spectral_mir::{run_analysis, BeatCandidate, FunctionId, PcmBuffer, RunRequest};

fn synthetic_audio(seconds: usize) -> Vec<f32> {
    // 440 Hz tone with a 2 kHz burst every half second
    (0..44100 * seconds)
        .map(|i| {
            let t = i as f32 / 44100.0;
            let burst = (-(t % 0.5) * 60.0).exp();
            (t * 440.0 * 2.0 * std::f32::consts::PI).sin() * 0.4
                + (t * 2000.0 * 2.0 * std::f32::consts::PI).sin() * 0.4 * burst
        })
        .collect()
}

fn bench_spectrogram(c: &mut Criterion) {
    let samples = synthetic_audio(30);
    let config = SpectrogramConfig::default();
    let cancel = CancellationToken::none();

    c.bench_function("spectrogram_30s", |b| {
        b.iter(|| compute_spectrogram(black_box(&samples), 44100, &config, &cancel));
    });
}

fn bench_mel(c: &mut Criterion) {
    let samples = synthetic_audio(30);
    let spec = compute_spectrogram(
        &samples,
        44100,
        &SpectrogramConfig::default(),
        &CancellationToken::none(),
    )
    .expect("spectrogram");
    let config = MelConfig::default();

    c.bench_function("mel_projection_30s", |b| {
        b.iter(|| compute_mel_spectrogram(black_box(&spec), &config));
    });
}

fn bench_tempo(c: &mut Criterion) {
    let candidates: Vec<BeatCandidate> = (0..240)
        .map(|k| BeatCandidate {
            time: k as f32 * 0.5 + if k % 4 == 0 { 0.01 } else { 0.0 },
            strength: if k % 4 == 0 { 1.0 } else { 0.6 },
            source: CandidateSource::Salience,
        })
        .collect();
    let config = TempoHypothesisConfig::default();

    c.bench_function("tempo_hypotheses_240", |b| {
        b.iter(|| generate_tempo_hypotheses(black_box(&candidates), &config));
    });
}

fn bench_full_tempo_run(c: &mut Criterion) {
    let audio = PcmBuffer::mono(44100, synthetic_audio(30));
    let request = RunRequest::new(FunctionId::TempoHypotheses);
    let cancel = CancellationToken::none();

    c.bench_function("run_tempo_hypotheses_30s", |b| {
        b.iter(|| run_analysis(black_box(&audio), &request, &cancel));
    });
}

criterion_group!(benches, bench_spectrogram, bench_mel, bench_tempo, bench_full_tempo_run);
criterion_main!(benches);
