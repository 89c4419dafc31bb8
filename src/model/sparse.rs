// src/model/sparse.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::data::FeatureMatrix;
use crate::error::{DismecError, Result};
use crate::model::Model;
use crate::types::{LabelId, LabelRange, Real};

/// Sparse per-label weight rows: `(index, value)` pairs above a sparsity
/// threshold, implicit zero elsewhere.
#[derive(Debug, Clone)]
pub struct SparseModel {
    label_range: LabelRange,
    num_features: usize,
    has_bias: bool,
    rows: Vec<Vec<(usize, Real)>>,
}

impl SparseModel {
    pub fn new(label_range: LabelRange, num_features: usize, has_bias: bool) -> Self {
        SparseModel {
            label_range,
            num_features,
            has_bias,
            rows: vec![Vec::new(); label_range.len()],
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

    pub fn row(&self, label: LabelId) -> Result<&[(usize, Real)]> {
        Ok(&self.rows[self.row_for(label)?])
    }
}

impl Model for SparseModel {
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
        self.rows[row] = weights
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0.0)
            .map(|(i, &v)| (i, v))
            .collect();
        Ok(())
    }

    fn weights_for_label(&self, label: LabelId) -> Result<Vec<Real>> {
        let row = self.row_for(label)?;
        let mut dense = vec![0.0; self.num_weights()];
        for &(idx, val) in &self.rows[row] {
            dense[idx] = val;
        }
        Ok(dense)
    }

    fn predict_scores(&self, features: &FeatureMatrix, begin: usize, end: usize, out: &mut [Real]) {
        let num_labels = self.label_range.len();
        debug_assert_eq!(out.len(), (end - begin) * num_labels);
        let bias_index = self.num_features;
        for (row_idx, example) in (begin..end).enumerate() {
            for label in 0..num_labels {
                let mut acc = 0.0;
                for &(idx, val) in &self.rows[label] {
                    if idx == bias_index {
                        acc += val;
                    } else {
                        acc += val * dense_feature_value(features, example, idx);
                    }
                }
                out[row_idx * num_labels + label] = acc;
            }
        }
    }
}

fn dense_feature_value(features: &FeatureMatrix, example: usize, index: usize) -> Real {
    match features {
        FeatureMatrix::Dense(m) => m[[example, index]],
        FeatureMatrix::Sparse { rows, .. } => rows[example]
            .iter()
            .find(|&&(idx, _)| idx == index)
            .map(|&(_, v)| v)
            .unwrap_or(0.0),
    }
}
