//! DSP performance benchmarks
//!
//! Measures per-block cost of the core processing units across the block
//! sizes a host typically runs.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ns_core::{Sample, Transport};
use ns_dsp::chorus::Chorus;
use ns_dsp::delay::StereoDelay;
use ns_dsp::saturation::{SaturationCurve, SaturationEngine};
use ns_dsp::spectrum::SpectrumAnalyzer;
use ns_dsp::synth::SynthEngine;
use ns_dsp::StereoProcessor;

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

/// Generate test audio (440 Hz sine)
fn generate_test_audio(samples: usize) -> Vec<Sample> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 0.5) as Sample
        })
        .collect()
}

fn bench_synth(c: &mut Criterion) {
    let mut group = c.benchmark_group("Voice Engine");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(
            BenchmarkId::new("8 voices", block_size),
            &block_size,
            |b, &size| {
                let mut synth = SynthEngine::new(SAMPLE_RATE);
                for note in [48, 52, 55, 59, 60, 64, 67, 72] {
                    synth.note_on(note, 100);
                }
                let mut left = vec![0.0; size];
                let mut right = vec![0.0; size];
                b.iter(|| {
                    left.fill(0.0);
                    right.fill(0.0);
                    synth.render(&mut left, &mut right, &[]);
                    black_box(left[0])
                });
            },
        );
    }

    group.finish();
}

fn bench_delay(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stereo Delay");
    let transport = Transport::stopped(120.0);

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(
            BenchmarkId::new("ping-pong", block_size),
            &block_size,
            |b, &size| {
                let mut delay = StereoDelay::new(SAMPLE_RATE);
                delay.set_feedback(0.7);
                let input = generate_test_audio(size);
                let mut left = input.clone();
                let mut right = input.clone();
                b.iter(|| {
                    left.copy_from_slice(&input);
                    right.copy_from_slice(&input);
                    delay.process_block(&mut left, &mut right, &transport);
                    black_box(left[0])
                });
            },
        );
    }

    group.finish();
}

fn bench_chorus(c: &mut Criterion) {
    let mut group = c.benchmark_group("Chorus");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(
            BenchmarkId::new("stereo", block_size),
            &block_size,
            |b, &size| {
                let mut chorus = Chorus::new(SAMPLE_RATE);
                let input = generate_test_audio(size);
                let mut left = input.clone();
                let mut right = input.clone();
                b.iter(|| {
                    left.copy_from_slice(&input);
                    right.copy_from_slice(&input);
                    chorus.process_block(&mut left, &mut right);
                    black_box(left[0])
                });
            },
        );
    }

    group.finish();
}

fn bench_saturation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Saturation");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(
            BenchmarkId::new("4x soft", block_size),
            &block_size,
            |b, &size| {
                let mut sat = SaturationEngine::new(SAMPLE_RATE, size);
                sat.set_curve(SaturationCurve::Soft);
                sat.set_drive(0.8);
                let input = generate_test_audio(size);
                let mut left = input.clone();
                let mut right = input.clone();
                b.iter(|| {
                    left.copy_from_slice(&input);
                    right.copy_from_slice(&input);
                    sat.process_block(&mut left, &mut right);
                    black_box(left[0])
                });
            },
        );
    }

    group.finish();
}

fn bench_spectrum(c: &mut Criterion) {
    let mut group = c.benchmark_group("Spectrum Analyzer");

    for &block_size in BLOCK_SIZES {
        group.bench_with_input(
            BenchmarkId::new("stft", block_size),
            &block_size,
            |b, &size| {
                let mut analyzer = SpectrumAnalyzer::new(SAMPLE_RATE);
                let input = generate_test_audio(size);
                b.iter(|| {
                    analyzer.process_block(black_box(&input), black_box(&input));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_synth,
    bench_delay,
    bench_chorus,
    bench_saturation,
    bench_spectrum
);
criterion_main!(benches);
