// src/solver/newton.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Truncated Newton with a conjugate-gradient inner solve and a
//! backtracking line search, the standard recipe for squared-hinge linear
//! SVM training (liblinear-style `TRON`/Newton-CG).

use crate::objective::Objective;
use crate::solver::{MinimizeResult, Minimizer};
use crate::types::Real;

#[derive(Debug, Clone, Copy)]
pub struct NewtonConfig {
    pub epsilon: Real,
    pub max_newton_iter: usize,
    pub max_cg_iter: usize,
    pub cg_tol: Real,
    pub line_search_shrink: Real,
    pub line_search_c1: Real,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        NewtonConfig {
            epsilon: 0.01,
            max_newton_iter: 100,
            max_cg_iter: 50,
            cg_tol: 0.1,
            line_search_shrink: 0.5,
            line_search_c1: 1e-4,
        }
    }
}

pub struct NewtonSolver {
    config: NewtonConfig,
}

impl NewtonSolver {
    pub fn new(config: NewtonConfig) -> Self {
        NewtonSolver { config }
    }
}

fn dot(a: &[Real], b: &[Real]) -> Real {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[Real]) -> Real {
    dot(a, a).sqrt()
}

/// Solve `H d = -g` approximately via conjugate gradient, where `H` is the
/// objective's Hessian-vector product at the current `w`.
fn conjugate_gradient(
    objective: &dyn Objective,
    w: &[Real],
    g: &[Real],
    max_iter: usize,
    tol: Real,
) -> Vec<Real> {
    let n = g.len();
    let mut d = vec![0.0; n];
    let mut r: Vec<Real> = g.iter().map(|gi| -gi).collect();
    let mut p = r.clone();
    let mut rs_old = dot(&r, &r);
    let target = tol * tol * rs_old;

    let mut hp = vec![0.0; n];
    for _ in 0..max_iter {
        if rs_old <= target {
            break;
        }
        objective.hessian_vector_product(w, &p, &mut hp);
        let php = dot(&p, &hp);
        if php <= 0.0 {
            break;
        }
        let alpha = rs_old / php;
        for i in 0..n {
            d[i] += alpha * p[i];
            r[i] -= alpha * hp[i];
        }
        let rs_new = dot(&r, &r);
        let beta = rs_new / rs_old;
        for i in 0..n {
            p[i] = r[i] + beta * p[i];
        }
        rs_old = rs_new;
    }
    d
}

impl Minimizer for NewtonSolver {
    fn minimize(&self, objective: &dyn Objective, w: &mut [Real]) -> MinimizeResult {
        let n = objective.num_weights();
        let mut grad = vec![0.0; n];
        objective.gradient(w, &mut grad);
        let grad0_norm = norm(&grad).max(1e-12);

        let mut value = objective.value(w);
        let mut iterations = 0;
        let mut converged = false;

        for _ in 0..self.config.max_newton_iter {
            let grad_norm = norm(&grad);
            if grad_norm <= self.config.epsilon * grad0_norm {
                converged = true;
                break;
            }

            let direction = conjugate_gradient(objective, w, &grad, self.config.max_cg_iter, self.config.cg_tol);
            let directional_derivative = dot(&grad, &direction);

            let mut step = 1.0;
            let mut accepted = false;
            for _ in 0..30 {
                let w_trial: Vec<Real> = w.iter().zip(&direction).map(|(wi, di)| wi + step * di).collect();
                let trial_value = objective.value(&w_trial);
                if trial_value <= value + self.config.line_search_c1 * step * directional_derivative {
                    w.copy_from_slice(&w_trial);
                    value = trial_value;
                    accepted = true;
                    break;
                }
                step *= self.config.line_search_shrink;
            }

            if !accepted {
                break;
            }

            objective.gradient(w, &mut grad);
            iterations += 1;
        }

        MinimizeResult {
            iterations,
            final_value: value,
            converged,
        }
    }

    fn set_epsilon(&mut self, epsilon: Real) {
        self.config.epsilon = epsilon;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureMatrix;
    use crate::objective::SquaredHingeObjective;
    use ndarray::Array2;
    use std::sync::Arc;

    #[test]
    fn converges_on_separable_toy_problem() {
        let features = Arc::new(FeatureMatrix::Dense(
            Array2::from_shape_vec((4, 2), vec![2.0, 0.0, 0.0, 2.0, -2.0, 0.0, 0.0, -2.0]).unwrap(),
        ));
        let mut objective = SquaredHingeObjective::new(features, false, 1.0);
        objective.update_label(&[0, 1], None);

        let solver = NewtonSolver::new(NewtonConfig::default());
        let mut w = vec![0.0, 0.0];
        let result = solver.minimize(&objective, &mut w);

        assert!(result.converged);
        assert!(objective.value(&w) <= objective.value(&[0.0, 0.0]));
    }
}
