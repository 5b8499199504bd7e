use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flatarray::FlatArray;
use nereval::scoring::score_documents;
use nereval::{classification_report, MentionMap, SeqevalConfig, SeqevalConfigBuilder};
use pprof::criterion::{Output, PProfProfiler};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const TYPES: [&str; 3] = ["LOC", "STREET", "BUILDING"];

fn build_sequences(n_seq: usize, seq_len: usize) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    // Seeded, so every run benchmarks the same labels.
    let mut rng = StdRng::seed_from_u64(42);
    let mut true_vec = Vec::with_capacity(n_seq);
    let mut pred_vec = Vec::with_capacity(n_seq);
    for _ in 0..n_seq {
        let mut true_seq = Vec::with_capacity(seq_len);
        let mut pred_seq = Vec::with_capacity(seq_len);
        let mut previous: Option<&str> = None;
        for _ in 0..seq_len {
            let label = match (rng.random_range(0..6u8), previous) {
                (0, _) => {
                    let ty = TYPES[rng.random_range(0..TYPES.len())];
                    previous = Some(ty);
                    format!("B-{}", ty)
                }
                (1, Some(ty)) => format!("I-{}", ty),
                _ => {
                    previous = None;
                    String::from("O")
                }
            };
            // One label out of ten is wrong in the predictions.
            let predicted = if rng.random_bool(0.1) {
                String::from("O")
            } else {
                label.clone()
            };
            true_seq.push(label);
            pred_seq.push(predicted);
        }
        true_vec.push(true_seq);
        pred_vec.push(pred_seq);
    }
    (true_vec, pred_vec)
}

fn benchmark_report(c: &mut Criterion, name: &str, config: SeqevalConfig) {
    let (true_vec, pred_vec) = build_sequences(5_000, 60);
    let y_true = FlatArray::new(true_vec);
    let y_pred = FlatArray::new(pred_vec);
    c.bench_function(name, |b| {
        b.iter(|| classification_report(black_box(&y_true), black_box(&y_pred), &config).unwrap())
    });
}

fn benchmark_sequential_report(c: &mut Criterion) {
    benchmark_report(c, "token_level_report_sequential", SeqevalConfig::default());
}

fn benchmark_parallel_report(c: &mut Criterion) {
    let config = SeqevalConfigBuilder::new().parallel(true).build();
    benchmark_report(c, "token_level_report_parallel", config);
}

fn benchmark_set_scores(c: &mut Criterion) {
    let (true_vec, pred_vec) = build_sequences(5_000, 60);
    let to_maps = |sequences: Vec<Vec<String>>| -> Vec<MentionMap> {
        sequences
            .iter()
            .map(|labels| {
                let tokens: Vec<String> = (0..labels.len()).map(|i| format!("w{}", i % 7)).collect();
                nereval::extract_mentions(&tokens, labels)
            })
            .collect()
    };
    let gold = to_maps(true_vec);
    let pred = to_maps(pred_vec);
    c.bench_function("set_based_scores", |b| {
        b.iter(|| score_documents(black_box(&gold), black_box(&pred)))
    });
}

criterion_group!(
    name=token_level_benches;
    config = Criterion::default().sample_size(50).with_profiler(PProfProfiler::new(3000, Output::Flamegraph(None)));
    targets =
    benchmark_sequential_report,
    benchmark_parallel_report,
    benchmark_set_scores,
);
criterion_main!(token_level_benches);
