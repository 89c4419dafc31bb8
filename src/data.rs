// src/data.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dense/sparse feature matrices and the multi-label dataset model.

use ndarray::Array2;

use crate::error::{DismecError, Result};
use crate::types::{LabelId, Real};

/// One row of a sparse matrix: sorted `(column, value)` pairs.
pub type SparseRow = Vec<(usize, Real)>;

/// Row-major feature matrix, dense or sparse, immutable for the lifetime of
/// a training/prediction run.
#[derive(Debug, Clone)]
pub enum FeatureMatrix {
    Dense(Array2<Real>),
    Sparse {
        rows: Vec<SparseRow>,
        num_cols: usize,
    },
}

impl FeatureMatrix {
    pub fn num_rows(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.nrows(),
            FeatureMatrix::Sparse { rows, .. } => rows.len(),
        }
    }

    pub fn num_cols(&self) -> usize {
        match self {
            FeatureMatrix::Dense(m) => m.ncols(),
            FeatureMatrix::Sparse { num_cols, .. } => *num_cols,
        }
    }

    /// Dot product of row `row` with a dense weight vector `w` (length
    /// `num_cols` or `num_cols + 1` with an appended bias of `1.0`).
    pub fn dot_row(&self, row: usize, w: &[Real]) -> Real {
        match self {
            FeatureMatrix::Dense(m) => {
                let r = m.row(row);
                let mut acc = 0.0;
                for (x, wi) in r.iter().zip(w.iter()) {
                    acc += x * wi;
                }
                if w.len() > r.len() {
                    acc += w[r.len()];
                }
                acc
            }
            FeatureMatrix::Sparse { rows, num_cols } => {
                let mut acc = 0.0;
                for &(idx, val) in &rows[row] {
                    acc += val * w[idx];
                }
                if w.len() > *num_cols {
                    acc += w[*num_cols];
                }
                acc
            }
        }
    }

    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        match self {
            FeatureMatrix::Dense(m) => {
                let mut out = Array2::zeros((indices.len(), m.ncols()));
                for (dst, &src) in indices.iter().enumerate() {
                    out.row_mut(dst).assign(&m.row(src));
                }
                FeatureMatrix::Dense(out)
            }
            FeatureMatrix::Sparse { rows, num_cols } => FeatureMatrix::Sparse {
                rows: indices.iter().map(|&i| rows[i].clone()).collect(),
                num_cols: *num_cols,
            },
        }
    }
}

/// A `+1`/`-1` labeling of all `N` examples for one label.
pub type BinaryLabelVector = Vec<Real>;

/// Multi-label incidence: for each label, the sorted set of example indices
/// where `y = 1`. The equivalent dense `+1`/`-1` vector is generated on
/// demand by `get_labels`.
#[derive(Debug, Clone, Default)]
pub struct MultiLabelIncidence {
    labels: Vec<Vec<usize>>,
}

impl MultiLabelIncidence {
    pub fn new(labels: Vec<Vec<usize>>) -> Self {
        MultiLabelIncidence { labels }
    }

    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }
}

/// A dataset: features plus a multi-label incidence over the same examples.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: FeatureMatrix,
    labels: MultiLabelIncidence,
}

impl Dataset {
    pub fn new(features: FeatureMatrix, labels: MultiLabelIncidence) -> Result<Self> {
        let dataset = Dataset { features, labels };
        dataset.check_invariants()?;
        Ok(dataset)
    }

    fn check_invariants(&self) -> Result<()> {
        let n = self.num_examples();
        for (label, instances) in self.labels.labels.iter().enumerate() {
            for &idx in instances {
                if idx >= n {
                    return Err(DismecError::shape(format!(
                        "label {label} references example {idx} but dataset has {n} examples"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn num_examples(&self) -> usize {
        self.features.num_rows()
    }

    pub fn num_features(&self) -> usize {
        self.features.num_cols()
    }

    pub fn num_labels(&self) -> usize {
        self.labels.num_labels()
    }

    pub fn num_positives(&self, label: LabelId) -> usize {
        self.labels.labels[label.to_index()].len()
    }

    pub fn num_negatives(&self, label: LabelId) -> usize {
        self.num_examples() - self.num_positives(label)
    }

    /// Dense `+1`/`-1` vector for `label`, length `num_examples`.
    pub fn get_labels(&self, label: LabelId) -> BinaryLabelVector {
        let mut target = vec![-1.0; self.num_examples()];
        for &ex in &self.labels.labels[label.to_index()] {
            target[ex] = 1.0;
        }
        target
    }

    /// Sorted example indices where `label` is positive.
    pub fn get_label_instances(&self, label: LabelId) -> &[usize] {
        &self.labels.labels[label.to_index()]
    }

    /// Truncate the dataset's label space to `[start, end)`, used to shard
    /// training across jobs. `end` is clamped to `num_labels`.
    pub fn select_labels(&mut self, start: usize, end: usize) {
        let end = end.min(self.labels.labels.len());
        let start = start.min(end);
        self.labels.labels = self.labels.labels[start..end].to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_dataset() -> Dataset {
        let features = FeatureMatrix::Dense(Array2::zeros((3, 2)));
        let labels = MultiLabelIncidence::new(vec![vec![1, 2], vec![0], vec![2]]);
        Dataset::new(features, labels).unwrap()
    }

    #[test]
    fn positives_and_negatives_sum_to_n() {
        let ds = toy_dataset();
        for l in 0..ds.num_labels() {
            let label = LabelId::new(l);
            assert_eq!(ds.num_positives(label) + ds.num_negatives(label), ds.num_examples());
        }
    }

    #[test]
    fn get_labels_matches_instances() {
        let ds = toy_dataset();
        assert_eq!(ds.get_label_instances(LabelId::new(0)), &[1, 2]);
        assert_eq!(ds.get_labels(LabelId::new(0)), vec![-1.0, 1.0, 1.0]);
    }

    #[test]
    fn out_of_range_instance_is_rejected() {
        let features = FeatureMatrix::Dense(Array2::zeros((2, 2)));
        let labels = MultiLabelIncidence::new(vec![vec![5]]);
        assert!(Dataset::new(features, labels).is_err());
    }

    #[test]
    fn select_labels_truncates() {
        let mut ds = toy_dataset();
        ds.select_labels(1, 3);
        assert_eq!(ds.num_labels(), 2);
        assert_eq!(ds.get_label_instances(LabelId::new(0)), &[0]);
    }
}
