use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scriptalign_cli::core::align::fuzzy::{best_score, compact_form};

fn bench_best_score_close_match(c: &mut Criterion) {
    let sentence = "the quick brown fox jumps over the lazy dog near the riverbank";
    let window = "the quick brown fox jumped over the lazy dog near the riverbank";

    c.bench_function("best_score_close_match", |b| {
        b.iter(|| best_score(black_box(sentence), black_box(window), black_box(75.0)))
    });
}

fn bench_best_score_compact_fallback(c: &mut Criterion) {
    let sentence = "jin gu shrine stands at the end of the path";
    let window = "jingu shrine stands at the end of the path";

    c.bench_function("best_score_compact_fallback", |b| {
        b.iter(|| best_score(black_box(sentence), black_box(window), black_box(75.0)))
    });
}

fn bench_best_score_long_window(c: &mut Criterion) {
    let sentence = "a ".repeat(40) + "sentence ends here finally";
    let window = "a ".repeat(40) + "sentence ends over there eventually";

    c.bench_function("best_score_long_window", |b| {
        b.iter(|| best_score(black_box(&sentence), black_box(&window), black_box(75.0)))
    });
}

fn bench_compact_form(c: &mut Criterion) {
    let text = "Jin-Gu! Shrine, \"near\" the (river)bank...";
    c.bench_function("compact_form_strip_punctuation", |b| {
        b.iter(|| compact_form(black_box(text)))
    });
}

criterion_group!(
    benches,
    bench_best_score_close_match,
    bench_best_score_compact_fallback,
    bench_best_score_long_window,
    bench_compact_form
);
criterion_main!(benches);
