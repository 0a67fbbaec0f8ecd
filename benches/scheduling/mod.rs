//! Benchmarks for turning material into timed work.

use std::hint::black_box;

use accordium::engine::allocator::VoiceAllocator;
use accordium::sequencing::{schedule_list, Envelope, Material, Part, Phrase, Score};
use criterion::{BenchmarkId, Criterion};

/// `parts` parts of `notes` notes each, every fourth step a four-note chord.
fn score(parts: u8, notes: usize) -> Score {
    let mut score = Score::new();
    for channel in 0..parts {
        let mut phrase = Phrase::new();
        for step in 0..notes {
            let root = 48 + (step % 24) as i32;
            if step % 4 == 0 {
                phrase.add_chord(&[root, root + 4, root + 7, root + 12], 1.0).unwrap();
            } else {
                phrase.add_note_list(&[root], &[0.5]).unwrap();
            }
        }
        let mut part = Part::new(channel).unwrap();
        part.add_phrase(phrase);
        score.add_part(part);
    }
    score
}

pub fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduling/flatten");

    for &(parts, notes) in &[(1u8, 256usize), (4, 1024), (16, 1024)] {
        let score = score(parts, notes);
        let label = format!("{parts}x{notes}");
        group.bench_with_input(BenchmarkId::new("schedule_list", &label), &score, |b, score| {
            b.iter(|| schedule_list(black_box(score)))
        });
    }

    // Promotion of a bare phrase is part of every play call
    let mut phrase = Phrase::new();
    phrase.add_note_list(&[60; 512], &[0.25; 512]).unwrap();
    group.bench_function("promote_phrase", |b| {
        b.iter(|| Material::from(black_box(phrase.clone())).into_score())
    });

    group.finish();
}

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduling/envelope");

    let simple = Envelope::default();
    let detailed = Envelope::new(
        vec![5.0, 10.0, 10.0, 20.0, 40.0],
        vec![0.3, 1.0, 0.8, 0.9, 0.7],
        30.0,
        0.6,
        100.0,
    )
    .unwrap();

    group.bench_function("default", |b| {
        b.iter(|| simple.compile(black_box(100), black_box(500.0)))
    });
    group.bench_function("five_stage_attack", |b| {
        b.iter(|| detailed.compile(black_box(100), black_box(500.0)))
    });
    group.bench_function("too_large", |b| {
        b.iter(|| detailed.compile(black_box(100), black_box(50.0)))
    });

    group.finish();
}

pub fn bench_allocator(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduling/allocator");

    for &voices in &[16usize, 64] {
        let mut allocator = VoiceAllocator::new(voices);
        let frequencies: Vec<f64> = (0..voices * 2).map(|i| 110.0 * (1.0 + i as f64 / 12.0)).collect();

        // Fill past capacity, then release everything
        group.bench_with_input(BenchmarkId::new("churn", voices), &voices, |b, _| {
            b.iter(|| {
                for &f in &frequencies {
                    black_box(allocator.allocate(f));
                }
                for &f in &frequencies {
                    black_box(allocator.deallocate(f));
                }
            })
        });
    }

    group.finish();
}
