// src/model/dense.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use ndarray::Array2;

use crate::data::FeatureMatrix;
use crate::error::{DismecError, Result};
use crate::model::Model;
use crate::types::{LabelId, LabelRange, Real};

/// Dense `L' x num_weights` weight matrix, one row per label.
#[derive(Debug, Clone)]
pub struct DenseModel {
    label_range: LabelRange,
    num_features: usize,
    has_bias: bool,
    weights: Array2<Real>,
}

impl DenseModel {
    pub fn new(label_range: LabelRange, num_features: usize, has_bias: bool) -> Self {
        let num_weights = num_features + if has_bias { 1 } else { 0 };
        DenseModel {
            label_range,
            num_features,
            has_bias,
            weights: Array2::zeros((label_range.len(), num_weights)),
        }
    }

    fn row_for(&self, label: LabelId) -> Result<usize> {
        if !self.label_range.contains(label) {
            return Err(DismecError::shape(format!(
                "label {} outside model range [{}, {})",
                label.to_index(),
                self.label_range.begin,
                self.label_range.end
            )));
        }
        Ok(label.to_index() - self.label_range.begin)
    }
}

impl Model for DenseModel {
    fn label_range(&self) -> LabelRange {
        self.label_range
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn has_bias(&self) -> bool {
        self.has_bias
    }

    fn set_weights_for_label(&mut self, label: LabelId, weights: &[Real]) -> Result<()> {
        let row = self.row_for(label)?;
        if weights.len() != self.num_weights() {
            return Err(DismecError::shape(format!(
                "expected {} weights, got {}",
                self.num_weights(),
                weights.len()
            )));
        }
        self.weights.row_mut(row).assign(&ndarray::ArrayView1::from(weights));
        Ok(())
    }

    fn weights_for_label(&self, label: LabelId) -> Result<Vec<Real>> {
        let row = self.row_for(label)?;
        Ok(self.weights.row(row).to_vec())
    }

    fn predict_scores(&self, features: &FeatureMatrix, begin: usize, end: usize, out: &mut [Real]) {
        let num_labels = self.label_range.len();
        debug_assert_eq!(out.len(), (end - begin) * num_labels);
        for (row_idx, example) in (begin..end).enumerate() {
            for label in 0..num_labels {
                let w = self.weights.row(label);
                let w_slice = w.as_slice().expect("dense weight row is contiguous");
                out[row_idx * num_labels + label] = features.dot_row(example, w_slice);
            }
        }
    }
}
