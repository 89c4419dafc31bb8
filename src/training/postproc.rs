// src/training/postproc.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-processors applied to a label's weight vector after minimization.

use crate::objective::Objective;
use crate::solver::MinimizeResult;
use crate::types::{LabelId, Real};

pub trait PostProcessor: Send {
    fn process(&mut self, label: LabelId, weight: &mut [Real], result: &MinimizeResult, objective: &dyn Objective);
}

pub struct Identity;

impl PostProcessor for Identity {
    fn process(&mut self, _label: LabelId, _weight: &mut [Real], _result: &MinimizeResult, _objective: &dyn Objective) {}
}

/// Zeroes components with `|w_i| < eps`.
pub struct Culling {
    pub eps: Real,
}

impl PostProcessor for Culling {
    fn process(&mut self, _label: LabelId, weight: &mut [Real], _result: &MinimizeResult, _objective: &dyn Objective) {
        for w in weight.iter_mut() {
            if w.abs() < self.eps {
                *w = 0.0;
            }
        }
    }
}

/// Applies a fixed permutation to undo a training-time feature reordering.
/// `order[i]` is the source index of output position `i`.
pub struct Reorder {
    pub order: Vec<usize>,
}

impl PostProcessor for Reorder {
    fn process(&mut self, _label: LabelId, weight: &mut [Real], _result: &MinimizeResult, _objective: &dyn Objective) {
        let permuted: Vec<Real> = self.order.iter().map(|&src| weight[src]).collect();
        weight.copy_from_slice(&permuted);
    }
}

pub struct Combined {
    pub children: Vec<Box<dyn PostProcessor>>,
}

impl PostProcessor for Combined {
    fn process(&mut self, label: LabelId, weight: &mut [Real], result: &MinimizeResult, objective: &dyn Objective) {
        for child in self.children.iter_mut() {
            child.process(label, weight, result, objective);
        }
    }
}

struct BoundData {
    cutoff: Real,
    nnz: usize,
    loss: Real,
}

/// Finds a non-negative cutoff `c` such that zeroing every `|w_i| < c`
/// still keeps the loss within `(1 + tol) * final_value + 1e-5`, then
/// applies it.
///
/// Maintains running statistics `(mean, std)` of `log(cutoff)` across
/// prior labels to bracket the search cheaply before bisecting.
pub struct Sparsify {
    tolerance: Real,
    num_values: Real,
    sum_log: Real,
    sum_sqr_log: Real,
    pub last_cutoff: Real,
    pub last_nnz_fraction: Real,
    pub last_binary_search_steps: usize,
}

impl Sparsify {
    /// `seed` is the initial value of `log(cutoff)` before any label has
    /// been processed; the upstream default is `log(0.02)`.
    pub fn new(tolerance: Real, seed: Real) -> Self {
        Sparsify {
            tolerance,
            num_values: 1.0,
            sum_log: seed,
            sum_sqr_log: seed * seed,
            last_cutoff: 0.0,
            last_nnz_fraction: 0.0,
            last_binary_search_steps: 0,
        }
    }

    fn make_sparse(target: &mut [Real], source: &[Real], cutoff: Real) -> usize {
        let mut nnz = 0;
        for (t, &s) in target.iter_mut().zip(source) {
            if s.abs() < cutoff {
                *t = 0.0;
            } else {
                *t = s;
                nnz += 1;
            }
        }
        nnz
    }

    fn check_bound(&self, objective: &dyn Objective, source: &[Real], scratch: &mut [Real], log_cutoff: Real) -> BoundData {
        let cutoff = log_cutoff.exp();
        let nnz = Self::make_sparse(scratch, source, cutoff);
        let loss = objective.value(scratch);
        BoundData { cutoff, nnz, loss }
    }

    fn find_initial_bounds(
        &self,
        objective: &dyn Objective,
        weight: &[Real],
        scratch: &mut [Real],
        tolerance: Real,
        initial_lower: Real,
    ) -> (BoundData, BoundData) {
        let mean_log = self.sum_log / self.num_values;
        let std_log = (self.sum_sqr_log / self.num_values - mean_log * mean_log + 1e-5).sqrt();

        let at_mean = self.check_bound(objective, weight, scratch, mean_log);
        if at_mean.loss > tolerance {
            let minus_std = self.check_bound(objective, weight, scratch, mean_log - std_log);
            if minus_std.loss > tolerance {
                (
                    BoundData { cutoff: 0.0, nnz: weight.len(), loss: initial_lower },
                    minus_std,
                )
            } else {
                (minus_std, at_mean)
            }
        } else {
            let plus_std = self.check_bound(objective, weight, scratch, mean_log + std_log);
            if plus_std.loss > tolerance {
                (at_mean, plus_std)
            } else {
                let plus_3std = self.check_bound(objective, weight, scratch, mean_log + 3.0 * std_log);
                if plus_3std.loss > tolerance {
                    (plus_std, plus_3std)
                } else {
                    let max_coeff = weight.iter().fold(Real::MIN_POSITIVE, |m, &w| m.max(w.abs()));
                    let at_max = self.check_bound(objective, weight, scratch, max_coeff.ln());
                    (plus_3std, at_max)
                }
            }
        }
    }
}

impl PostProcessor for Sparsify {
    fn process(&mut self, _label: LabelId, weight: &mut [Real], result: &MinimizeResult, objective: &dyn Objective) {
        let tolerance = (1.0 + self.tolerance) * result.final_value + 1e-5;
        let mut scratch = weight.to_vec();

        let (mut lower, mut upper) = self.find_initial_bounds(objective, weight, &mut scratch, tolerance, result.final_value);

        let mut steps = 0;
        while lower.nnz.saturating_sub(upper.nnz) > upper.nnz / 10 + 1 {
            let middle = (upper.cutoff + lower.cutoff) / 2.0;
            let nnz = Self::make_sparse(&mut scratch, weight, middle);
            let new_score = objective.value(&scratch);
            if new_score > tolerance {
                upper = BoundData { cutoff: middle, nnz, loss: new_score };
            } else {
                lower = BoundData { cutoff: middle, nnz, loss: new_score };
            }
            steps += 1;
        }
        self.last_binary_search_steps = steps;

        let original = weight.to_vec();
        Self::make_sparse(weight, &original, lower.cutoff);

        self.num_values += 1.0;
        let log_cutoff = lower.cutoff.max(Real::MIN_POSITIVE).ln();
        self.sum_log += log_cutoff;
        self.sum_sqr_log += log_cutoff * log_cutoff;

        self.last_cutoff = lower.cutoff;
        self.last_nnz_fraction = 100.0 * lower.nnz as Real / weight.len() as Real;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureMatrix;
    use crate::objective::SquaredHingeObjective;
    use crate::solver::MinimizeResult;
    use ndarray::Array2;
    use std::sync::Arc;

    fn dummy_objective() -> SquaredHingeObjective {
        let features = Arc::new(FeatureMatrix::Dense(Array2::zeros((2, 3))));
        let mut obj = SquaredHingeObjective::new(features, false, 1.0);
        obj.update_label(&[0], None);
        obj
    }

    #[test]
    fn identity_is_noop() {
        let objective = dummy_objective();
        let mut w = vec![1.0, -2.0, 3.0];
        let before = w.clone();
        let result = MinimizeResult { iterations: 1, final_value: 0.0, converged: true };
        Identity.process(LabelId::new(0), &mut w, &result, &objective);
        assert_eq!(w, before);
    }

    #[test]
    fn culling_zero_is_identity_culling_inf_zeros() {
        let objective = dummy_objective();
        let result = MinimizeResult { iterations: 1, final_value: 0.0, converged: true };
        let mut w = vec![1.0, -2.0, 3.0];
        let before = w.clone();
        Culling { eps: 0.0 }.process(LabelId::new(0), &mut w, &result, &objective);
        assert_eq!(w, before);

        let mut w = vec![1.0, -2.0, 3.0];
        Culling { eps: Real::INFINITY }.process(LabelId::new(0), &mut w, &result, &objective);
        assert_eq!(w, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn reorder_self_inverse_round_trips() {
        let objective = dummy_objective();
        let result = MinimizeResult { iterations: 1, final_value: 0.0, converged: true };
        let mut w = vec![10.0, 20.0, 30.0];
        let original = w.clone();
        // permutation (0 1 2) -> (2 0 1), its inverse is (1 2 0)
        let mut forward = Reorder { order: vec![2, 0, 1] };
        let mut backward = Reorder { order: vec![1, 2, 0] };
        forward.process(LabelId::new(0), &mut w, &result, &objective);
        backward.process(LabelId::new(0), &mut w, &result, &objective);
        assert_eq!(w, original);
    }

    #[test]
    fn sparsify_never_exceeds_tolerance_and_never_increases_nnz() {
        let features = Arc::new(FeatureMatrix::Dense(
            Array2::from_shape_vec((4, 3), vec![1.0, 0.0, 0.2, 0.0, 1.0, 0.1, -1.0, 0.0, 0.15, 0.0, -1.0, 0.05]).unwrap(),
        ));
        let mut objective = SquaredHingeObjective::new(features, false, 1.0);
        objective.update_label(&[0, 1], None);

        let w_star = vec![2.0, 1.5, 0.01];
        let final_value = objective.value(&w_star);
        let result = MinimizeResult { iterations: 5, final_value, converged: true };

        let mut w = w_star.clone();
        let nnz_before = w.iter().filter(|v| **v != 0.0).count();
        let mut sparsify = Sparsify::new(0.1, 0.02f64.ln());
        sparsify.process(LabelId::new(0), &mut w, &result, &objective);

        assert!(objective.value(&w) <= 1.1 * final_value + 1e-5);
        let nnz_after = w.iter().filter(|v| **v != 0.0).count();
        assert!(nnz_after <= nnz_before);
    }
}
