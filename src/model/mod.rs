// src/model/mod.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trained model representations: a weight vector per label, dense or
//! sparse, scored against a feature block.

mod dense;
mod sparse;

pub use dense::DenseModel;
pub use sparse::SparseModel;

use crate::data::FeatureMatrix;
use crate::error::Result;
use crate::types::{LabelId, LabelRange, Real};

/// `predict_scores` is the single contract both representations implement:
/// score a block of examples against every label the model covers.
pub trait Model {
    fn label_range(&self) -> LabelRange;
    fn num_features(&self) -> usize;
    fn has_bias(&self) -> bool;

    /// Number of weights per label (`num_features` or `num_features + 1`).
    fn num_weights(&self) -> usize {
        self.num_features() + if self.has_bias() { 1 } else { 0 }
    }

    /// Install the weight vector for `label` (absolute label id, must fall
    /// within `label_range`).
    fn set_weights_for_label(&mut self, label: LabelId, weights: &[Real]) -> Result<()>;

    /// Dense copy of the weight vector for `label`, length `num_weights`.
    fn weights_for_label(&self, label: LabelId) -> Result<Vec<Real>>;

    /// Score `features[begin..end]` against every label in this model.
    /// `out` is row-major `(end - begin) x label_range.len()`.
    fn predict_scores(&self, features: &FeatureMatrix, begin: usize, end: usize, out: &mut [Real]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn dense_and_sparse_agree_on_scores() {
        let features = FeatureMatrix::Dense(Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 0.0, 1.0, 0.0]).unwrap());

        let mut dense = DenseModel::new(LabelRange::new(0, 2), 3, false);
        dense.set_weights_for_label(LabelId::new(0), &[1.0, 0.0, 0.0]).unwrap();
        dense.set_weights_for_label(LabelId::new(1), &[0.0, 1.0, 1.0]).unwrap();

        let mut sparse = SparseModel::new(LabelRange::new(0, 2), 3, false);
        sparse
            .set_weights_for_label(LabelId::new(0), &[1.0, 0.0, 0.0])
            .unwrap();
        sparse
            .set_weights_for_label(LabelId::new(1), &[0.0, 1.0, 1.0])
            .unwrap();

        let mut dense_out = vec![0.0; 2 * 2];
        let mut sparse_out = vec![0.0; 2 * 2];
        dense.predict_scores(&features, 0, 2, &mut dense_out);
        sparse.predict_scores(&features, 0, 2, &mut sparse_out);

        assert_eq!(dense_out, sparse_out);
        assert_eq!(dense_out, vec![1.0, 5.0, 0.0, 1.0]);
    }
}
