//! Benchmark rounding sweeps over chains of growing rank.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use ttkit_tensortrain::TtTensor;

fn build_summed_chain(degree: usize, local_dim: usize, terms: usize) -> TtTensor<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let dims = vec![local_dim; degree];
    let ranks = vec![3usize; degree - 1];

    let mut acc = TtTensor::<f64>::random(&dims, &ranks, &mut rng).unwrap();
    for _ in 1..terms {
        let next = TtTensor::<f64>::random(&dims, &ranks, &mut rng).unwrap();
        acc.add_assign(&next).unwrap();
    }
    acc
}

fn bench_round(c: &mut Criterion) {
    let mut group = c.benchmark_group("round");

    for &terms in &[2usize, 4, 8] {
        let chain = build_summed_chain(6, 4, terms);
        group.bench_with_input(BenchmarkId::from_parameter(terms), &chain, |b, chain| {
            b.iter(|| {
                let mut work = chain.clone();
                work.round_rank(3).unwrap();
                black_box(work.ranks())
            })
        });
    }
    group.finish();
}

fn bench_move_core(c: &mut Criterion) {
    let chain = build_summed_chain(8, 4, 4);
    c.bench_function("move_core_end_to_end", |b| {
        b.iter(|| {
            let mut work = chain.clone();
            work.canonicalize_right().unwrap();
            work.canonicalize_left().unwrap();
            black_box(work.core_position())
        })
    });
}

criterion_group!(benches, bench_round, bench_move_core);
criterion_main!(benches);
