use criterion::{black_box, criterion_group, criterion_main, Criterion};

use linkparse::{NoPostProcessing, ParseOptions, Sentence};

/// A chain where every inner word can hang off any earlier one, so the number of
/// linkages grows exponentially with the length
fn ambiguous_chain(len: usize) -> Sentence {
  let mut src = String::from("w0: @A+;\n");
  for w in 1..len - 1 {
    src.push_str(&format!("w{}: A- | A- & @A+ | [0.5] A- & B+ | [0.5] B- & @A+;\n", w));
  }
  src.push_str(&format!("w{}: A- | B-;\n", len - 1));
  src.parse().unwrap()
}

fn parse(sent: &Sentence, opts: &ParseOptions) -> i64 {
  sent.parse_with(opts, &NoPostProcessing).num_linkages_found
}

fn criterion_benchmark(c: &mut Criterion) {
  let opts = ParseOptions::default();
  let short = ambiguous_chain(8);
  let long = ambiguous_chain(30);
  let nulls = ParseOptions {
    max_null_count: 2,
    islands_ok: true,
    ..Default::default()
  };

  c.bench_function("parse short chain", |b| {
    b.iter(|| parse(black_box(&short), black_box(&opts)))
  });

  c.bench_function("parse long chain", |b| {
    b.iter(|| parse(black_box(&long), black_box(&opts)))
  });

  c.bench_function("parse long chain with islands", |b| {
    b.iter(|| parse(black_box(&long), black_box(&nulls)))
  });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
