use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_labels(c: &mut Criterion) {
    // Warm the OnceLock so the steady-state lookup cost is measured.
    let _ = castellan::labels::all();

    c.bench_function("labels_all", |b| {
        b.iter(|| black_box(castellan::labels::all().len()))
    });
    c.bench_function("labels_index_of_promotion", |b| {
        b.iter(|| black_box(castellan::labels::index_of(black_box("e7e8q"))))
    });
}

criterion_group!(benches, bench_labels);
criterion_main!(benches);
