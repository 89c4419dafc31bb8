// src/prediction.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scoring a feature matrix against a trained (possibly sharded) ensemble:
//! dense per-label scores, bounded top-K selection via insertion-sort merge,
//! and confusion-matrix accounting against ground truth.

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::data::{Dataset, FeatureMatrix};
use crate::model::Model;
use crate::parallel::task::TaskGenerator;
use crate::types::{LabelId, Real, ThreadId};

/// One top-K hit: an absolute label id and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub label: usize,
    pub score: Real,
}

/// Insert `(score, label)` into `list`, kept sorted by descending score and
/// bounded to `k` entries. This is the merge step used both within one
/// shard's scores and across shards of a sharded model.
fn insert_topk(list: &mut Vec<Hit>, k: usize, score: Real, label: usize) {
    if k == 0 {
        return;
    }
    let pos = list.partition_point(|h| h.score > score);
    if pos < list.len() || list.len() < k {
        list.insert(pos, Hit { label, score });
        if list.len() > k {
            list.truncate(k);
        }
    }
}

/// Scores a block of examples against one or more model shards (each
/// covering a disjoint `LabelRange`) and keeps the top `k` labels per
/// example. Thread-safe: each worker owns disjoint example indices.
pub struct TopKPredictor {
    shards: Vec<Arc<dyn Model + Send + Sync>>,
    features: Arc<FeatureMatrix>,
    k: usize,
    results: Vec<Mutex<Vec<Hit>>>,
}

impl TopKPredictor {
    pub fn new(features: Arc<FeatureMatrix>, k: usize) -> Self {
        let num_examples = features.num_rows();
        TopKPredictor {
            shards: Vec::new(),
            features,
            k,
            results: (0..num_examples).map(|_| Mutex::new(Vec::with_capacity(k))).collect(),
        }
    }

    /// Register another model shard (a disjoint label range trained and
    /// predicted independently, e.g. from a different machine). Shards are
    /// merged per example at prediction time, so they may be added in any
    /// order and need not share a label numbering origin.
    pub fn add_shard(&mut self, model: Arc<dyn Model + Send + Sync>) {
        self.shards.push(model);
    }

    fn num_examples(&self) -> usize {
        self.features.num_rows()
    }

    pub fn results_for(&self, example: usize) -> Vec<Hit> {
        self.results[example].lock().unwrap().clone()
    }

    /// All results, one row per example, after `finalize` has run.
    pub fn into_results(self) -> Vec<Vec<Hit>> {
        self.results.into_iter().map(|m| m.into_inner().unwrap()).collect()
    }

    /// Global confusion matrix over every `(example, label)` pair in the
    /// shards' combined scored range, compared against `ground_truth`'s
    /// label incidence. Truncation-independent: a label counts as
    /// "predicted positive" when its raw score is `> 0`, regardless of
    /// whether it made the top-K shortlist (spec'd after
    /// `original_source/src/prediction/prediction.cpp`'s
    /// `TopKPredictionTaskGenerator::run_tasks`). `ground_truth` must cover
    /// the same label numbering as the registered shards.
    pub fn confusion_matrix(&self, ground_truth: &Dataset) -> ConfusionMatrix {
        let num_labels: usize = self.shards.iter().map(|s| s.label_range().len()).sum();
        let num_examples = self.num_examples();
        let total = num_examples as u64 * num_labels as u64;

        let mut p_pred = 0u64;
        let mut tp = 0u64;
        let mut p_gt = 0u64;

        for shard in &self.shards {
            let range = shard.label_range();
            let mut scores = vec![0.0; num_examples * range.len()];
            shard.predict_scores(&self.features, 0, num_examples, &mut scores);

            for value in &scores {
                if *value > 0.0 {
                    p_pred += 1;
                }
            }

            for local in 0..range.len() {
                let label = range.begin + local;
                let positives = ground_truth.get_label_instances(LabelId::new(label));
                p_gt += positives.len() as u64;
                for &example in positives {
                    if scores[example * range.len() + local] > 0.0 {
                        tp += 1;
                    }
                }
            }
        }

        let fp = p_pred - tp;
        let fn_ = p_gt - tp;
        let tn = total + tp - p_pred - p_gt;

        ConfusionMatrix { tp, fp, fn_, tn }
    }
}

impl TaskGenerator for TopKPredictor {
    fn num_tasks(&self) -> i64 {
        self.num_examples() as i64
    }

    fn run_tasks(&self, begin: i64, end: i64, _thread_id: ThreadId) {
        for example in begin as usize..end as usize {
            let mut hits = Vec::with_capacity(self.k);
            let mut scratch = Vec::new();
            for shard in &self.shards {
                let num_labels = shard.label_range().len();
                scratch.resize(num_labels, 0.0);
                shard.predict_scores(&self.features, example, example + 1, &mut scratch);
                for (local, &score) in scratch.iter().enumerate() {
                    let label = shard.label_range().begin + local;
                    insert_topk(&mut hits, self.k, score, label);
                }
            }
            *self.results[example].lock().unwrap() = hits;
        }
    }
}

/// A confusion matrix aggregated over every `(example, label)` pair,
/// treating top-K membership as the positive prediction.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConfusionMatrix {
    pub tp: u64,
    pub fp: u64,
    pub fn_: u64,
    pub tn: u64,
}

impl ConfusionMatrix {
    pub fn precision(&self) -> Real {
        if self.tp + self.fp == 0 {
            0.0
        } else {
            self.tp as Real / (self.tp + self.fp) as Real
        }
    }

    pub fn recall(&self) -> Real {
        if self.tp + self.fn_ == 0 {
            0.0
        } else {
            self.tp as Real / (self.tp + self.fn_) as Real
        }
    }
}

/// Dense prediction: scores every label for every example, no top-K
/// truncation. Used for small label spaces or debugging a trained shard.
pub struct DenseScorer {
    model: Arc<dyn Model + Send + Sync>,
    features: Arc<FeatureMatrix>,
    scores: Mutex<Vec<Real>>,
}

impl DenseScorer {
    pub fn new(model: Arc<dyn Model + Send + Sync>, features: Arc<FeatureMatrix>) -> Self {
        let size = features.num_rows() * model.label_range().len();
        DenseScorer {
            model,
            features,
            scores: Mutex::new(vec![0.0; size]),
        }
    }

    pub fn into_scores(self) -> Vec<Real> {
        self.scores.into_inner().unwrap()
    }
}

impl TaskGenerator for DenseScorer {
    fn num_tasks(&self) -> i64 {
        self.features.num_rows() as i64
    }

    fn run_tasks(&self, begin: i64, end: i64, _thread_id: ThreadId) {
        let num_labels = self.model.label_range().len();
        let mut local = vec![0.0; (end - begin) as usize * num_labels];
        self.model.predict_scores(&self.features, begin as usize, end as usize, &mut local);
        let mut scores = self.scores.lock().unwrap();
        scores[begin as usize * num_labels..end as usize * num_labels].copy_from_slice(&local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::MultiLabelIncidence;
    use crate::model::DenseModel;
    use crate::types::LabelRange;
    use ndarray::Array2;

    fn toy_features() -> Arc<FeatureMatrix> {
        Arc::new(FeatureMatrix::Dense(
            Array2::from_shape_vec((2, 2), vec![1.0, 0.0, 0.0, 1.0]).unwrap(),
        ))
    }

    #[test]
    fn insert_topk_keeps_bounded_and_sorted() {
        let mut hits = Vec::new();
        for (label, score) in [(0, 1.0), (1, 3.0), (2, 2.0), (3, 0.5)] {
            insert_topk(&mut hits, 2, score, label);
        }
        assert_eq!(hits, vec![Hit { label: 1, score: 3.0 }, Hit { label: 2, score: 2.0 }]);
    }

    #[test]
    fn top_k_predictor_merges_shards_and_reports_confusion() {
        let features = toy_features();
        let mut model_a = DenseModel::new(LabelRange::new(0, 1), 2, false);
        model_a.set_weights_for_label(LabelId::new(0), &[1.0, 0.0]).unwrap();
        let mut model_b = DenseModel::new(LabelRange::new(1, 2), 2, false);
        model_b.set_weights_for_label(LabelId::new(1), &[0.0, 1.0]).unwrap();

        let mut predictor = TopKPredictor::new(features.clone(), 1);
        predictor.add_shard(Arc::new(model_a));
        predictor.add_shard(Arc::new(model_b));

        use crate::parallel::ParallelRunner;
        let runner = ParallelRunner::new(1, 1);
        runner.run(&mut predictor, 0).unwrap();

        assert_eq!(predictor.results_for(0), vec![Hit { label: 0, score: 1.0 }]);
        assert_eq!(predictor.results_for(1), vec![Hit { label: 1, score: 1.0 }]);

        let ground_truth = Dataset::new((*features).clone(), MultiLabelIncidence::new(vec![vec![0], vec![1]])).unwrap();
        let confusion = predictor.confusion_matrix(&ground_truth);
        assert_eq!(confusion.tp, 2);
        assert_eq!(confusion.fp, 0);
        assert_eq!(confusion.fn_, 0);
    }

    #[test]
    fn confusion_matrix_counts_true_positives_outside_the_top_k_shortlist() {
        // A single example with two true labels that both score positive,
        // but a K=1 shortlist only keeps the higher-scoring one. The
        // confusion matrix must still count both as true positives, since
        // it is defined over the full scored range, not the shortlist.
        let features = Arc::new(FeatureMatrix::Dense(Array2::from_shape_vec((1, 1), vec![1.0]).unwrap()));
        let mut model = DenseModel::new(LabelRange::new(0, 3), 1, false);
        model.set_weights_for_label(LabelId::new(0), &[2.0]).unwrap();
        model.set_weights_for_label(LabelId::new(1), &[1.0]).unwrap();
        model.set_weights_for_label(LabelId::new(2), &[-1.0]).unwrap();

        let mut predictor = TopKPredictor::new(features.clone(), 1);
        predictor.add_shard(Arc::new(model));

        use crate::parallel::ParallelRunner;
        let runner = ParallelRunner::new(1, 1);
        runner.run(&mut predictor, 0).unwrap();

        assert_eq!(predictor.results_for(0), vec![Hit { label: 0, score: 2.0 }]);

        let ground_truth =
            Dataset::new((*features).clone(), MultiLabelIncidence::new(vec![vec![0], vec![0], vec![]])).unwrap();
        let confusion = predictor.confusion_matrix(&ground_truth);
        assert_eq!(confusion.tp, 2);
        assert_eq!(confusion.fp, 0);
        assert_eq!(confusion.fn_, 0);
        assert_eq!(confusion.tn, 1);
    }
}
