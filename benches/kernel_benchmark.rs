//! Kernel evaluation and one-vs-one training on EMNIST-shaped sparse images

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use emnist_svm::kernel::{LinearKernel, RBFKernel};
use emnist_svm::{Kernel, OneVsOne, OptimizerConfig, Sample, SparseVector, IMAGE_PIXELS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Random image with roughly `ink` of its pixels set, values in [0, 1]
fn random_image(rng: &mut StdRng, ink: f64) -> SparseVector {
    let mut indices = Vec::new();
    let mut values = Vec::new();
    for i in 0..IMAGE_PIXELS {
        if rng.gen_bool(ink) {
            indices.push(i);
            values.push(rng.gen_range(0.05..1.0));
        }
    }
    SparseVector::new(indices, values)
}

/// Classes differ by which band of rows carries the ink
fn banded_samples(rng: &mut StdRng, per_class: usize, n_classes: usize) -> Vec<Sample> {
    let band = IMAGE_PIXELS / n_classes;
    let mut samples = Vec::with_capacity(per_class * n_classes);
    for class in 0..n_classes {
        for _ in 0..per_class {
            let mut indices = Vec::new();
            let mut values = Vec::new();
            for i in class * band..(class + 1) * band {
                if rng.gen_bool(0.4) {
                    indices.push(i);
                    values.push(rng.gen_range(0.2..1.0));
                }
            }
            samples.push(Sample::with_class(SparseVector::new(indices, values), class));
        }
    }
    samples
}

fn bench_kernels(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut group = c.benchmark_group("kernel_784px");

    for ink in [0.1, 0.2, 0.4] {
        let x = random_image(&mut rng, ink);
        let y = random_image(&mut rng, ink);

        let linear = LinearKernel::new();
        group.bench_with_input(BenchmarkId::new("linear", ink), &ink, |b, _| {
            b.iter(|| linear.compute(black_box(&x), black_box(&y)))
        });

        let rbf = RBFKernel::new(1.0 / IMAGE_PIXELS as f64);
        group.bench_with_input(BenchmarkId::new("rbf", ink), &ink, |b, _| {
            b.iter(|| rbf.compute(black_box(&x), black_box(&y)))
        });
    }
    group.finish();
}

fn bench_one_vs_one(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(11);
    let samples = banded_samples(&mut rng, 20, 4);
    let kernel = Arc::new(RBFKernel::new(0.05));
    let config = OptimizerConfig::default();

    c.bench_function("one_vs_one_fit_4x20", |b| {
        b.iter(|| OneVsOne::train(kernel.clone(), &config, black_box(&samples)))
    });
}

criterion_group!(benches, bench_kernels, bench_one_vs_one);
criterion_main!(benches);
