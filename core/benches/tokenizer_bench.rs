use bookindex_core::{Tokenizer, TokenizerConfig};
use criterion::{criterion_group, criterion_main, Criterion};

const OPENING: &str = "Call me Ishmael. Some years ago—never mind how long precisely—having little or no \
money in my purse, and nothing particular to interest me on shore, I thought I would sail about a little \
and see the watery part of the world. It is a way I have of driving off the spleen, and regulating the \
circulation. Whenever I find myself growing grim about the mouth; whenever it is a damp, drizzly November \
in my soul; whenever I find myself involuntarily pausing before coffin warehouses, and bringing up the rear \
of every funeral I meet; then, I account it high time to get to sea as soon as I can. ";

fn bench_tokenize(c: &mut Criterion) {
    let text = OPENING.repeat(200);
    let stemmed = Tokenizer::new(&TokenizerConfig::default()).expect("tokenizer");
    let plain = Tokenizer::new(&TokenizerConfig { stemming: false, ..TokenizerConfig::default() }).expect("tokenizer");
    c.bench_function("tokenize_moby_dick_stemmed", |b| b.iter(|| stemmed.normalize_and_tokenize(&text)));
    c.bench_function("tokenize_moby_dick_plain", |b| b.iter(|| plain.normalize_and_tokenize(&text)));
}

criterion_group!(benches, bench_tokenize);
criterion_main!(benches);
