//! Example: Tempo and beat grid for a WAV file
//!
//! ```text
//! cargo run --example analyze_file -- path/to/track.wav
//! RUST_LOG=debug cargo run --example analyze_file -- path/to/track.wav
//! ```

use spectral_mir::config::PhaseAlignmentConfig;
use spectral_mir::tempo::align_phase;
use spectral_mir::{
    run_analysis, AudioSource, BeatGrid, CancellationToken, FunctionId, PcmBuffer, RunOutput,
    RunRequest,
};

/// Decode a WAV file into planar f32 channels
fn load_wav(path: &str) -> Result<PcmBuffer, Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_value))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(PcmBuffer::from_interleaved(
        spec.sample_rate,
        spec.channels as usize,
        &samples,
    ))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .ok_or("usage: analyze_file <file.wav>")?;
    let audio = load_wav(&path)?;
    let cancel = CancellationToken::none();

    println!(
        "{}: {:.2}s, {} Hz, {} channel(s)",
        path,
        audio.duration_seconds(),
        audio.sample_rate(),
        audio.number_of_channels()
    );

    let candidates = match run_analysis(
        &audio,
        &RunRequest::new(FunctionId::BeatCandidates),
        &cancel,
    )?
    .output
    {
        RunOutput::BeatCandidates(result) => result,
        other => return Err(format!("unexpected output {}", other.kind()).into()),
    };

    let tempo = run_analysis(&audio, &RunRequest::new(FunctionId::TempoHypotheses), &cancel)?;
    let hypotheses = match &tempo.output {
        RunOutput::TempoHypotheses(result) => result,
        other => return Err(format!("unexpected output {}", other.kind()).into()),
    };

    println!("Beat candidates: {}", candidates.candidates.len());
    println!("Tempo hypotheses ({:.1} ms):", tempo.meta.timings.total_ms);
    for h in &hypotheses.hypotheses {
        println!(
            "  {:>6}  {:7.2} BPM  confidence {:.2}  family {} (x{:.2})",
            h.id, h.bpm, h.confidence, h.family_id, h.harmonic_ratio
        );
    }
    for warning in &hypotheses.warnings {
        println!("  warning: {}", warning);
    }

    let Some(best) = hypotheses.best() else {
        return Ok(());
    };
    let phase = align_phase(&candidates.candidates, best.bpm, &PhaseAlignmentConfig::default())?;
    if let Some(top) = phase.hypotheses.first() {
        let grid = BeatGrid::from_phase(best.bpm, top)?;
        let beats = grid.beat_times(audio.duration_seconds());
        println!(
            "Beat grid: {:.2} BPM, phase {:.3}s (score {:.2}), {} beats",
            grid.bpm,
            grid.phase_offset,
            top.score,
            beats.len()
        );
        let preview: Vec<String> = beats.iter().take(8).map(|t| format!("{:.3}", t)).collect();
        println!("  first beats: {}", preview.join(", "));
    }

    Ok(())
}
