// src/objective/mod.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-label convex objectives. An objective is mutated in place across
//! labels to avoid reallocation; it is therefore per-worker and not
//! thread-safe (see `update_features`/`update_costs`/`update_label`).

mod squared_hinge;

pub use squared_hinge::SquaredHingeObjective;

use crate::types::Real;

/// A convex loss over a single label's binary sub-problem.
///
/// `num_weights` is `num_features` or `num_features + 1` with a bias
/// column. Regularization is per-weight so a combined dense+sparse
/// ("Cascade") objective can apply distinct strengths per feature source.
pub trait Objective: Send {
    fn num_weights(&self) -> usize;

    fn value(&self, w: &[Real]) -> Real;
    fn gradient(&self, w: &[Real], out: &mut [Real]);
    fn hessian_vector_product(&self, w: &[Real], v: &[Real], out: &mut [Real]);

    /// Replace the current label's positive/negative instances. `positives`
    /// is the sorted set of example indices with `y = 1`; all other
    /// examples (or, if `restrict` is given, all other examples in
    /// `restrict`) are negative.
    fn update_label(&mut self, positives: &[usize], restrict: Option<&[usize]>);

    /// Set the per-class costs multiplying the hinge penalty.
    fn update_costs(&mut self, cost_pos: Real, cost_neg: Real);

    fn get_label_ref(&self) -> &[Real];
}
