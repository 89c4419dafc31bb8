// src/objective/squared_hinge.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Squared-hinge SVC objective: `0.5 * sum(reg_j * w_j^2) + sum_i cost_i *
//! max(0, 1 - y_i * w.x_i)^2`. Dense and sparse feature matrices share one
//! implementation via `FeatureMatrix::dot_row`; the "Cascade" variant
//! concatenates a dense and a sparse source with independent
//! regularization per segment.

use std::sync::Arc;

use crate::data::FeatureMatrix;
use crate::objective::Objective;
use crate::types::Real;

enum Features {
    Single(Arc<FeatureMatrix>),
    Cascade {
        dense: Arc<FeatureMatrix>,
        sparse: Arc<FeatureMatrix>,
    },
}

impl Features {
    fn num_rows(&self) -> usize {
        match self {
            Features::Single(f) => f.num_rows(),
            Features::Cascade { dense, .. } => dense.num_rows(),
        }
    }

    fn num_cols(&self) -> usize {
        match self {
            Features::Single(f) => f.num_cols(),
            Features::Cascade { dense, sparse } => dense.num_cols() + sparse.num_cols(),
        }
    }

    fn dot_row(&self, row: usize, w: &[Real]) -> Real {
        match self {
            Features::Single(f) => f.dot_row(row, w),
            Features::Cascade { dense, sparse } => {
                let d = dense.num_cols();
                dense.dot_row(row, &w[..d]) + sparse.dot_row(row, &w[d..])
            }
        }
    }

    /// Accumulate `scale * x_row` into `out` (over the active weight
    /// range only, i.e. without the bias column).
    fn axpy_row(&self, row: usize, scale: Real, out: &mut [Real]) {
        match self {
            Features::Single(f) => axpy_single(f, row, scale, out),
            Features::Cascade { dense, sparse } => {
                let d = dense.num_cols();
                axpy_single(dense, row, scale, &mut out[..d]);
                axpy_single(sparse, row, scale, &mut out[d..]);
            }
        }
    }
}

fn axpy_single(features: &FeatureMatrix, row: usize, scale: Real, out: &mut [Real]) {
    match features {
        FeatureMatrix::Dense(m) => {
            for (o, x) in out.iter_mut().zip(m.row(row).iter()) {
                *o += scale * x;
            }
        }
        FeatureMatrix::Sparse { rows, .. } => {
            for &(idx, val) in &rows[row] {
                out[idx] += scale * val;
            }
        }
    }
}

pub struct SquaredHingeObjective {
    features: Features,
    has_bias: bool,
    regularization: Vec<Real>,
    labels: Vec<Real>,
    active: Vec<usize>,
    cost_pos: Real,
    cost_neg: Real,
}

impl SquaredHingeObjective {
    pub fn new(features: Arc<FeatureMatrix>, has_bias: bool, regularization: Real) -> Self {
        let f = Features::Single(features);
        let num_weights = f.num_cols() + if has_bias { 1 } else { 0 };
        let num_rows = f.num_rows();
        SquaredHingeObjective {
            features: f,
            has_bias,
            regularization: vec![regularization; num_weights],
            labels: vec![-1.0; num_rows],
            active: Vec::new(),
            cost_pos: 1.0,
            cost_neg: 1.0,
        }
    }

    pub fn new_cascade(
        dense: Arc<FeatureMatrix>,
        sparse: Arc<FeatureMatrix>,
        has_bias: bool,
        reg_dense: Real,
        reg_sparse: Real,
    ) -> Self {
        assert_eq!(dense.num_rows(), sparse.num_rows());
        let f = Features::Cascade { dense, sparse };
        let d = match &f {
            Features::Cascade { dense, .. } => dense.num_cols(),
            _ => unreachable!(),
        };
        let s = f.num_cols() - d;
        let mut regularization = vec![reg_dense; d];
        regularization.extend(std::iter::repeat_n(reg_sparse, s));
        if has_bias {
            regularization.push(reg_sparse);
        }
        let num_rows = f.num_rows();
        SquaredHingeObjective {
            labels: vec![-1.0; num_rows],
            features: f,
            has_bias,
            regularization,
            active: Vec::new(),
            cost_pos: 1.0,
            cost_neg: 1.0,
        }
    }

    fn margin(&self, w: &[Real], row: usize) -> Real {
        self.features.dot_row(row, w)
    }

    fn cost_for(&self, row: usize) -> Real {
        if self.labels[row] > 0.0 {
            self.cost_pos
        } else {
            self.cost_neg
        }
    }

    fn rows(&self) -> std::slice::Iter<'_, usize> {
        self.active.iter()
    }
}

impl Objective for SquaredHingeObjective {
    fn num_weights(&self) -> usize {
        self.features.num_cols() + if self.has_bias { 1 } else { 0 }
    }

    fn value(&self, w: &[Real]) -> Real {
        let reg: Real = self
            .regularization
            .iter()
            .zip(w.iter())
            .map(|(r, wi)| 0.5 * r * wi * wi)
            .sum();

        let loss: Real = self
            .rows()
            .map(|&i| {
                let y = self.labels[i];
                let margin = 1.0 - y * self.margin(w, i);
                if margin > 0.0 {
                    self.cost_for(i) * margin * margin
                } else {
                    0.0
                }
            })
            .sum();

        reg + loss
    }

    fn gradient(&self, w: &[Real], out: &mut [Real]) {
        for (o, (r, wi)) in out.iter_mut().zip(self.regularization.iter().zip(w.iter())) {
            *o = r * wi;
        }

        let feature_cols = self.features.num_cols();
        let mut bias_grad = 0.0;
        for &i in self.rows() {
            let y = self.labels[i];
            let margin = 1.0 - y * self.margin(w, i);
            if margin > 0.0 {
                let scale = -2.0 * self.cost_for(i) * y * margin;
                self.features.axpy_row(i, scale, &mut out[..feature_cols]);
                if self.has_bias {
                    bias_grad += scale;
                }
            }
        }
        if self.has_bias {
            out[feature_cols] += bias_grad;
        }
    }

    fn hessian_vector_product(&self, w: &[Real], v: &[Real], out: &mut [Real]) {
        for (o, (r, vi)) in out.iter_mut().zip(self.regularization.iter().zip(v.iter())) {
            *o = r * vi;
        }

        let feature_cols = self.features.num_cols();
        let mut bias_hv = 0.0;
        for &i in self.rows() {
            let y = self.labels[i];
            let margin = 1.0 - y * self.margin(w, i);
            if margin > 0.0 {
                let xv = self.features.dot_row(i, v);
                let scale = 2.0 * self.cost_for(i) * xv;
                self.features.axpy_row(i, scale, &mut out[..feature_cols]);
                if self.has_bias {
                    bias_hv += scale;
                }
            }
        }
        if self.has_bias {
            out[feature_cols] += bias_hv;
        }
    }

    fn update_label(&mut self, positives: &[usize], restrict: Option<&[usize]>) {
        let n = self.features.num_rows();
        self.labels = vec![-1.0; n];
        for &p in positives {
            self.labels[p] = 1.0;
        }
        self.active = match restrict {
            Some(rows) => rows.to_vec(),
            None => (0..n).collect(),
        };
    }

    fn update_costs(&mut self, cost_pos: Real, cost_neg: Real) {
        self.cost_pos = cost_pos;
        self.cost_neg = cost_neg;
    }

    fn get_label_ref(&self) -> &[Real] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn dense_features() -> Arc<FeatureMatrix> {
        Arc::new(FeatureMatrix::Dense(
            Array2::from_shape_vec((4, 2), vec![1.0, 0.0, 0.0, 1.0, -1.0, 0.0, 0.0, -1.0]).unwrap(),
        ))
    }

    #[test]
    fn value_is_zero_at_large_margin_weights() {
        let mut obj = SquaredHingeObjective::new(dense_features(), false, 0.0);
        obj.update_label(&[0, 1], None);
        let w = [100.0, 100.0];
        assert_eq!(obj.value(&w), 0.0);
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let mut obj = SquaredHingeObjective::new(dense_features(), false, 1.0);
        obj.update_label(&[0, 1], None);
        let w = [0.3, -0.2];
        let mut grad = [0.0; 2];
        obj.gradient(&w, &mut grad);

        let eps = 1e-6;
        for j in 0..2 {
            let mut wp = w;
            wp[j] += eps;
            let mut wm = w;
            wm[j] -= eps;
            let numeric = (obj.value(&wp) - obj.value(&wm)) / (2.0 * eps);
            assert!((numeric - grad[j]).abs() < 1e-3, "component {j}: {numeric} vs {}", grad[j]);
        }
    }

    #[test]
    fn hessian_vector_product_matches_gradient_directional_derivative() {
        let mut obj = SquaredHingeObjective::new(dense_features(), false, 1.0);
        obj.update_label(&[0, 1], None);
        let w = [0.3, -0.2];
        let v = [1.0, 0.5];
        let eps = 1e-6;

        let mut g0 = [0.0; 2];
        obj.gradient(&w, &mut g0);
        let mut wp = w;
        wp[0] += eps * v[0];
        wp[1] += eps * v[1];
        let mut g1 = [0.0; 2];
        obj.gradient(&wp, &mut g1);

        let numeric_hv: Vec<Real> = (0..2).map(|j| (g1[j] - g0[j]) / eps).collect();

        let mut hv = [0.0; 2];
        obj.hessian_vector_product(&w, &v, &mut hv);

        for j in 0..2 {
            assert!((numeric_hv[j] - hv[j]).abs() < 1e-2);
        }
    }
}
