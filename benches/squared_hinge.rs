// benches/squared_hinge.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use dismec::data::FeatureMatrix;
use dismec::objective::{Objective, SquaredHingeObjective};
use ndarray::Array2;

fn dense_features(rows: usize, cols: usize) -> Arc<FeatureMatrix> {
    let data: Vec<f64> = (0..rows * cols).map(|i| ((i % 7) as f64 - 3.0) * 0.1).collect();
    Arc::new(FeatureMatrix::Dense(Array2::from_shape_vec((rows, cols), data).unwrap()))
}

fn bench_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("squared_hinge_gradient");
    for &rows in &[1_000usize, 10_000] {
        let cols = 128;
        let features = dense_features(rows, cols);
        let mut obj = SquaredHingeObjective::new(features, true, 1.0);
        let positives: Vec<usize> = (0..rows).step_by(10).collect();
        obj.update_label(&positives, None);
        let w = vec![0.01; obj.num_weights()];
        let mut grad = vec![0.0; obj.num_weights()];

        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            b.iter(|| obj.gradient(&w, &mut grad));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gradient);
criterion_main!(benches);
