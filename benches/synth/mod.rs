//! Benchmarks for the oscillator bank inside the audio callback.

use std::collections::VecDeque;
use std::hint::black_box;

use accordium::dsp::oscillator::Waveform;
use accordium::synth::{OscillatorBank, SynthMessage};
use criterion::{BenchmarkId, Criterion};

use crate::BLOCK_SIZES;

fn playing_bank(voices: usize, waveform: Waveform) -> OscillatorBank<VecDeque<SynthMessage>> {
    let mut rx = VecDeque::new();
    for voice in 0..voices {
        rx.push_back(SynthMessage::SetFrequency {
            voice,
            frequency: 110.0 * (voice + 1) as f32,
        });
        rx.push_back(SynthMessage::SetVolume {
            voice,
            amplitude: 0.5,
            ramp_secs: 0.05,
        });
        rx.push_back(SynthMessage::Play { voice });
    }
    OscillatorBank::new(voices, waveform, 48_000.0, rx)
}

pub fn bench_bank(c: &mut Criterion) {
    let mut group = c.benchmark_group("synth/bank");

    for &size in BLOCK_SIZES {
        // interleaved stereo
        let mut buffer = vec![0.0f32; size * 2];

        let mut sine = playing_bank(16, Waveform::Sine);
        group.bench_with_input(BenchmarkId::new("sine_16", size), &size, |b, _| {
            b.iter(|| sine.render_block(black_box(&mut buffer)))
        });

        let mut saw = playing_bank(16, Waveform::Sawtooth);
        group.bench_with_input(BenchmarkId::new("sawtooth_16", size), &size, |b, _| {
            b.iter(|| saw.render_block(black_box(&mut buffer)))
        });

        // All voices idle: the floor cost of the callback
        let mut idle = OscillatorBank::new(16, Waveform::Sine, 48_000.0, VecDeque::new());
        group.bench_with_input(BenchmarkId::new("idle_16", size), &size, |b, _| {
            b.iter(|| idle.render_block(black_box(&mut buffer)))
        });
    }

    group.finish();
}
