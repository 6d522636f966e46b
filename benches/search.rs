//! Benchmarks for the structure search and refiner.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use rand::SeedableRng;
use rand::rngs::StdRng;

use cable_evolve::{
    compute::{
        LocalRefiner, NoopObserver, PopulationSearch, StructureModel, UniformFieldOracle,
        biased_choice,
    },
    schema::{CurrentMode, MutationMask, RefinerConfig, SearchConfig, StructureSpec},
};

fn bench_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_generation");
    group.sample_size(20);

    for population_size in [50, 100, 200] {
        for parallel in [false, true] {
            let config = SearchConfig {
                population_size,
                keep_size: population_size / 5,
                generations: 2,
                current_mode: CurrentMode::Induced,
                parallel,
                random_seed: Some(1),
                ..Default::default()
            };

            group.bench_with_input(
                BenchmarkId::new(
                    if parallel { "parallel" } else { "sequential" },
                    population_size,
                ),
                &population_size,
                |b, _| {
                    b.iter(|| {
                        let mut search =
                            PopulationSearch::new(config.clone(), UniformFieldOracle::default())
                                .unwrap();
                        black_box(search.run().unwrap().best_score);
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_mutate(c: &mut Criterion) {
    let mut group = c.benchmark_group("mutate");

    for node_count in [10, 20, 50, 100] {
        let spec = StructureSpec {
            node_count,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let structure = StructureModel::generate(&spec, &mut rng).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_nodes", node_count)),
            &node_count,
            |b, _| {
                b.iter(|| black_box(structure.mutate(0.1, MutationMask::default(), &mut rng)));
            },
        );
    }

    group.finish();
}

fn bench_biased_choice(c: &mut Criterion) {
    let mut group = c.benchmark_group("biased_choice");

    for size in [100, 1000] {
        let pool: Vec<usize> = (0..size).collect();
        let mut rng = StdRng::seed_from_u64(5);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| black_box(biased_choice(&pool, size / 5, 4.0, &mut rng).unwrap()));
        });
    }

    group.finish();
}

fn bench_refine(c: &mut Criterion) {
    let spec = StructureSpec {
        node_count: 10,
        ..Default::default()
    };
    let structure = StructureModel::generate(&spec, &mut StdRng::seed_from_u64(9)).unwrap();
    let oracle = UniformFieldOracle::default();
    let refiner = LocalRefiner::new(RefinerConfig::default()).unwrap();

    c.bench_function("refine_10_nodes", |b| {
        b.iter(|| {
            black_box(
                refiner
                    .refine(&structure, &oracle, &mut NoopObserver)
                    .unwrap()
                    .score,
            )
        });
    });
}

criterion_group!(
    benches,
    bench_generation,
    bench_mutate,
    bench_biased_choice,
    bench_refine
);
criterion_main!(benches);
