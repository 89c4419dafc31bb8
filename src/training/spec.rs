// src/training/spec.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `TrainingSpec`: the policy object that assembles a per-label objective,
//! minimizer, initializer and post-processor. `DismecTraining` is the
//! plain squared-hinge recipe; `CascadeTraining` pairs a dense and a
//! sparse feature source with independent regularization and an optional
//! per-label shortlist restricting the sub-problem.

use std::sync::Arc;

use crate::data::{Dataset, FeatureMatrix};
use crate::model::{DenseModel, Model, SparseModel};
use crate::objective::{Objective, SquaredHingeObjective};
use crate::solver::{Minimizer, NewtonConfig, NewtonSolver};
use crate::training::initializer::{ConstantInitializer, FeatureMeanInitializer, PretrainedInitializer, WeightsInitializer, ZeroInitializer};
use crate::training::postproc::{Culling, Identity, PostProcessor, Sparsify};
use crate::types::{LabelId, LabelRange, Real};

/// Which dense/sparse representation the output model should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Dense,
    Sparse,
}

/// Which `WeightsInitializer` a `TrainingSpec` should hand out.
pub enum InitKind {
    Zero,
    Constant(Vec<Real>),
    Mean(Real),
    Pretrained(Arc<dyn Model + Send + Sync>),
}

/// Which `PostProcessor` a `TrainingSpec` should hand out.
pub enum PostKind {
    Identity,
    Culling(Real),
    Sparsify(Real),
}

pub trait TrainingSpec: Send + Sync {
    fn dataset(&self) -> &Dataset;
    fn label_range(&self) -> LabelRange;
    fn epsilon_base(&self) -> Real;

    fn make_objective(&self) -> Box<dyn Objective>;
    fn make_minimizer(&self) -> Box<dyn Minimizer>;
    fn make_initializer(&self) -> Box<dyn WeightsInitializer>;
    fn make_post_processor(&self) -> Box<dyn PostProcessor>;
    fn make_model(&self) -> Box<dyn Model + Send + Sync>;

    /// Install label `label`'s positives/negatives into the objective.
    fn update_objective(&self, objective: &mut dyn Objective, label: LabelId);

    /// Scale the minimizer's convergence tolerance for label `label`:
    /// rarer labels need tighter convergence to avoid collapsing to the
    /// trivial all-negative solution.
    fn update_minimizer(&self, minimizer: &mut dyn Minimizer, label: LabelId);

    fn local_index(&self, label: LabelId) -> usize {
        label.to_index() - self.label_range().begin
    }
}

pub struct DismecTraining {
    dataset: Dataset,
    features: Arc<FeatureMatrix>,
    label_range: LabelRange,
    regularization: Real,
    has_bias: bool,
    epsilon_base: Real,
    model_kind: ModelKind,
    post_kind: PostKind,
    init_kind: InitKind,
}

impl DismecTraining {
    pub fn new(dataset: Dataset, label_range: LabelRange, regularization: Real, has_bias: bool, epsilon_base: Real, model_kind: ModelKind) -> Self {
        let features = Arc::new(dataset.features().clone());
        DismecTraining {
            dataset,
            features,
            label_range,
            regularization,
            has_bias,
            epsilon_base,
            model_kind,
            post_kind: PostKind::Identity,
            init_kind: InitKind::Zero,
        }
    }

    pub fn with_culling(mut self, eps: Real) -> Self {
        self.post_kind = PostKind::Culling(eps);
        self
    }

    pub fn with_post(mut self, kind: PostKind) -> Self {
        self.post_kind = kind;
        self
    }

    pub fn with_initializer(mut self, kind: InitKind) -> Self {
        self.init_kind = kind;
        self
    }
}

impl TrainingSpec for DismecTraining {
    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn label_range(&self) -> LabelRange {
        self.label_range
    }

    fn epsilon_base(&self) -> Real {
        self.epsilon_base
    }

    fn make_objective(&self) -> Box<dyn Objective> {
        Box::new(SquaredHingeObjective::new(self.features.clone(), self.has_bias, self.regularization))
    }

    fn make_minimizer(&self) -> Box<dyn Minimizer> {
        Box::new(NewtonSolver::new(NewtonConfig::default()))
    }

    fn make_initializer(&self) -> Box<dyn WeightsInitializer> {
        match &self.init_kind {
            InitKind::Zero => Box::new(ZeroInitializer),
            InitKind::Constant(init) => Box::new(ConstantInitializer::new(init.clone())),
            InitKind::Mean(scale) => Box::new(FeatureMeanInitializer::new(self.features.clone(), *scale)),
            InitKind::Pretrained(source) => Box::new(PretrainedInitializer::new(source.clone())),
        }
    }

    fn make_post_processor(&self) -> Box<dyn PostProcessor> {
        match self.post_kind {
            PostKind::Identity => Box::new(Identity),
            PostKind::Culling(eps) => Box::new(Culling { eps }),
            PostKind::Sparsify(tolerance) => Box::new(Sparsify::new(tolerance, 0.02f64.ln())),
        }
    }

    fn make_model(&self) -> Box<dyn Model + Send + Sync> {
        match self.model_kind {
            ModelKind::Dense => Box::new(DenseModel::new(self.label_range, self.dataset.num_features(), self.has_bias)),
            ModelKind::Sparse => Box::new(SparseModel::new(self.label_range, self.dataset.num_features(), self.has_bias)),
        }
    }

    fn update_objective(&self, objective: &mut dyn Objective, label: LabelId) {
        let positives = self.dataset.get_label_instances(LabelId::new(self.local_index(label)));
        objective.update_label(positives, None);
        objective.update_costs(1.0, 1.0);
    }

    fn update_minimizer(&self, minimizer: &mut dyn Minimizer, label: LabelId) {
        let n = self.dataset.num_examples();
        let p = self.dataset.num_positives(LabelId::new(self.local_index(label)));
        let scale = (p.min(n - p)).max(1) as Real / n as Real;
        minimizer.set_epsilon(self.epsilon_base * scale);
    }
}

/// `Cascade` training: a dense embedding feature source and a sparse
/// feature source, each with its own regularization strength, plus an
/// optional per-label shortlist restricting the sub-problem to a row
/// subset (class weights are forced to `(1.0, 1.0)` when a shortlist is
/// in effect).
pub struct CascadeTraining {
    dataset: Dataset,
    dense_features: Arc<FeatureMatrix>,
    sparse_features: Arc<FeatureMatrix>,
    label_range: LabelRange,
    reg_dense: Real,
    reg_sparse: Real,
    has_bias: bool,
    epsilon_base: Real,
    model_kind: ModelKind,
    shortlists: Option<Vec<Vec<usize>>>,
}

impl CascadeTraining {
    pub fn new(
        dataset: Dataset,
        dense_features: Arc<FeatureMatrix>,
        sparse_features: Arc<FeatureMatrix>,
        label_range: LabelRange,
        reg_dense: Real,
        reg_sparse: Real,
        has_bias: bool,
        epsilon_base: Real,
        model_kind: ModelKind,
    ) -> Self {
        CascadeTraining {
            dataset,
            dense_features,
            sparse_features,
            label_range,
            reg_dense,
            reg_sparse,
            has_bias,
            epsilon_base,
            model_kind,
            shortlists: None,
        }
    }

    pub fn with_shortlists(mut self, shortlists: Vec<Vec<usize>>) -> Self {
        self.shortlists = Some(shortlists);
        self
    }

    fn shortlist_for(&self, local: usize) -> Option<&[usize]> {
        self.shortlists.as_ref().map(|s| s[local].as_slice())
    }
}

impl TrainingSpec for CascadeTraining {
    fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    fn label_range(&self) -> LabelRange {
        self.label_range
    }

    fn epsilon_base(&self) -> Real {
        self.epsilon_base
    }

    fn make_objective(&self) -> Box<dyn Objective> {
        Box::new(SquaredHingeObjective::new_cascade(
            self.dense_features.clone(),
            self.sparse_features.clone(),
            self.has_bias,
            self.reg_dense,
            self.reg_sparse,
        ))
    }

    fn make_minimizer(&self) -> Box<dyn Minimizer> {
        Box::new(NewtonSolver::new(NewtonConfig::default()))
    }

    fn make_initializer(&self) -> Box<dyn WeightsInitializer> {
        Box::new(ZeroInitializer)
    }

    fn make_post_processor(&self) -> Box<dyn PostProcessor> {
        Box::new(Identity)
    }

    fn make_model(&self) -> Box<dyn Model + Send + Sync> {
        let num_features = self.dense_features.num_cols() + self.sparse_features.num_cols();
        match self.model_kind {
            ModelKind::Dense => Box::new(DenseModel::new(self.label_range, num_features, self.has_bias)),
            ModelKind::Sparse => Box::new(SparseModel::new(self.label_range, num_features, self.has_bias)),
        }
    }

    fn update_objective(&self, objective: &mut dyn Objective, label: LabelId) {
        let local = self.local_index(label);
        let positives = self.dataset.get_label_instances(LabelId::new(local));
        let restrict = self.shortlist_for(local);

        let restricted_positives: Vec<usize>;
        let effective_positives: &[usize] = if let Some(rows) = restrict {
            restricted_positives = positives.iter().copied().filter(|p| rows.contains(p)).collect();
            &restricted_positives
        } else {
            positives
        };

        objective.update_label(effective_positives, restrict);
        objective.update_costs(1.0, 1.0);
    }

    fn update_minimizer(&self, minimizer: &mut dyn Minimizer, label: LabelId) {
        let local = self.local_index(label);
        let (n, p) = match self.shortlist_for(local) {
            Some(rows) => {
                let positives = self.dataset.get_label_instances(LabelId::new(local));
                let p = rows.iter().filter(|r| positives.contains(r)).count();
                (rows.len(), p)
            }
            None => (self.dataset.num_examples(), self.dataset.num_positives(LabelId::new(local))),
        };
        let scale = (p.min(n.saturating_sub(p))).max(1) as Real / n.max(1) as Real;
        minimizer.set_epsilon(self.epsilon_base * scale);
    }
}
