//! Partitioning and solving benchmarks.
//!
//! Run with:
//! ```bash
//! cargo bench --bench partition
//! ```

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use crave_rs::config::GeneratorConfig;
use crave_rs::constraint::ConstraintRegistry;
use crave_rs::context::Context;
use crave_rs::generator::Generator;
use crave_rs::partition::ConstraintPartitioner;
use crave_rs::variables::Var;

// ============================================================================
// Helper: Chains of related variables
// ============================================================================

/// Build `groups` independent chains of `len` variables, `v[i] < v[i+1]` within a chain.
fn build_chains(ctx: &Context, registry: &mut ConstraintRegistry, groups: usize, len: usize) -> Vec<Var<u8>> {
    let mut vars = Vec::new();
    for _ in 0..groups {
        let chain: Vec<Var<u8>> = (0..len).map(|_| ctx.var()).collect();
        for pair in chain.windows(2) {
            registry.make_constraint(None, pair[0].lt(&pair[1]), false, false).unwrap();
        }
        vars.extend(chain);
    }
    vars
}

/// Random binary constraints over `num_vars` variables.
fn build_random(ctx: &Context, registry: &mut ConstraintRegistry, num_vars: usize, num_constraints: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let vars: Vec<Var<u8>> = (0..num_vars).map(|_| ctx.var()).collect();
    for _ in 0..num_constraints {
        let a = &vars[rng.gen_range(0..num_vars)];
        let b = &vars[rng.gen_range(0..num_vars)];
        let expr = match rng.gen_range(0..3) {
            0 => a.le(b),
            1 => a.not_equal(b),
            _ => (a + 1).ge(b),
        };
        registry.make_constraint(None, expr, false, false).unwrap();
    }
}

// ============================================================================
// Benchmark: Partitioning only
// ============================================================================

fn bench_partition_random(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition/random");

    for num_vars in [50, 200, 800] {
        let ctx = Context::new();
        let mut registry = ConstraintRegistry::new(&ctx);
        build_random(&ctx, &mut registry, num_vars, num_vars / 2, 42);

        group.bench_with_input(BenchmarkId::new("vars", num_vars), &registry, |b, registry| {
            b.iter(|| {
                let mut partitioner = ConstraintPartitioner::new();
                partitioner.merge(registry);
                partitioner.partition();
                partitioner.partitions().len()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Plain vs multithreaded solving
// ============================================================================

fn bench_solve_chains(c: &mut Criterion) {
    let mut group = c.benchmark_group("generator/chains");
    group.sample_size(10);

    for multithreaded in [false, true] {
        let ctx = Context::new();
        let config = GeneratorConfig::default().with_seed(7).with_multithreading(multithreaded);
        let mut generator = Generator::with_config(&ctx, config);
        let mut registry = ConstraintRegistry::new(&ctx);
        build_chains(&ctx, &mut registry, 8, 6);
        generator.merge(&registry);
        generator.rebuild(false).unwrap();

        let name = if multithreaded { "threaded" } else { "plain" };
        group.bench_function(BenchmarkId::new(name, "8x6"), |b| {
            b.iter(|| generator.next().unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition_random, bench_solve_chains);
criterion_main!(benches);
