// src/training/initializer.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Weight-vector initialization strategies invoked once per label, before
//! the minimizer runs.

use std::sync::Arc;

use crate::data::FeatureMatrix;
use crate::model::Model;
use crate::objective::Objective;
use crate::types::{LabelId, Real};

pub trait WeightsInitializer: Send {
    fn get_initial_weight(&self, label: LabelId, target: &mut [Real], objective: &dyn Objective);
}

/// Always starts from the zero vector.
pub struct ZeroInitializer;

impl WeightsInitializer for ZeroInitializer {
    fn get_initial_weight(&self, _label: LabelId, target: &mut [Real], _objective: &dyn Objective) {
        target.fill(0.0);
    }
}

/// Starts every label from the same fixed vector.
pub struct ConstantInitializer {
    init: Vec<Real>,
}

impl ConstantInitializer {
    pub fn new(init: Vec<Real>) -> Self {
        ConstantInitializer { init }
    }
}

impl WeightsInitializer for ConstantInitializer {
    fn get_initial_weight(&self, _label: LabelId, target: &mut [Real], _objective: &dyn Objective) {
        target.copy_from_slice(&self.init);
    }
}

/// Reads the initial vector from a model trained in a previous run (e.g.
/// warm-starting from a coarser pass, or from weights loaded via the
/// NumPy model format).
pub struct PretrainedInitializer {
    source: Arc<dyn Model + Send + Sync>,
}

impl PretrainedInitializer {
    pub fn new(source: Arc<dyn Model + Send + Sync>) -> Self {
        PretrainedInitializer { source }
    }
}

impl WeightsInitializer for PretrainedInitializer {
    fn get_initial_weight(&self, label: LabelId, target: &mut [Real], _objective: &dyn Objective) {
        let weights = self
            .source
            .weights_for_label(label)
            .expect("pretrained model must cover every label being initialized");
        target.copy_from_slice(&weights);
    }
}

/// Initializes with the mean feature vector over the label's positive
/// examples, scaled by `scale`. A cheap but effective warm start: for a
/// linearly separable problem it already points roughly towards the
/// positive class.
pub struct FeatureMeanInitializer {
    features: Arc<FeatureMatrix>,
    scale: Real,
}

impl FeatureMeanInitializer {
    pub fn new(features: Arc<FeatureMatrix>, scale: Real) -> Self {
        FeatureMeanInitializer { features, scale }
    }
}

impl WeightsInitializer for FeatureMeanInitializer {
    fn get_initial_weight(&self, _label: LabelId, target: &mut [Real], objective: &dyn Objective) {
        target.fill(0.0);
        let labels = objective.get_label_ref();
        let mut count = 0usize;
        for (row, &y) in labels.iter().enumerate() {
            if y > 0.0 {
                count += 1;
                add_row_into(&self.features, row, target);
            }
        }
        if count > 0 {
            let inv = self.scale / count as Real;
            for t in target.iter_mut() {
                *t *= inv;
            }
        }
    }
}

fn add_row_into(features: &FeatureMatrix, row: usize, target: &mut [Real]) {
    match features {
        FeatureMatrix::Dense(m) => {
            for (t, x) in target.iter_mut().zip(m.row(row).iter()) {
                *t += x;
            }
        }
        FeatureMatrix::Sparse { rows, .. } => {
            for &(idx, val) in &rows[row] {
                target[idx] += val;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::SquaredHingeObjective;
    use ndarray::Array2;

    #[test]
    fn zero_initializer_zeroes_target() {
        let init = ZeroInitializer;
        let mut target = vec![1.0, 2.0, 3.0];
        let features = Arc::new(FeatureMatrix::Dense(Array2::zeros((1, 3))));
        let objective = SquaredHingeObjective::new(features, false, 1.0);
        init.get_initial_weight(LabelId::new(0), &mut target, &objective);
        assert_eq!(target, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn feature_mean_initializer_averages_positives() {
        let features = Arc::new(FeatureMatrix::Dense(
            Array2::from_shape_vec((3, 2), vec![2.0, 0.0, 4.0, 0.0, 0.0, 9.0]).unwrap(),
        ));
        let mut objective = SquaredHingeObjective::new(features.clone(), false, 1.0);
        objective.update_label(&[0, 1], None);

        let init = FeatureMeanInitializer::new(features, 1.0);
        let mut target = vec![0.0; 2];
        init.get_initial_weight(LabelId::new(0), &mut target, &objective);
        assert_eq!(target, vec![3.0, 0.0]);
    }
}
