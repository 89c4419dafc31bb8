// src/training/task.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-label training task: one `TaskGenerator` task trains exactly one
//! label through the pipeline `update_objective -> update_minimizer ->
//! get_initial_weight -> minimize -> post.process -> set_weights_for_label`.
//! Objective/minimizer/initializer/post-processor instances are created once
//! per worker thread in `init_thread` so their scratch allocations land on
//! that thread's NUMA node.

use std::sync::Mutex;

use crate::model::Model;
use crate::parallel::task::TaskGenerator;
use crate::training::initializer::WeightsInitializer;
use crate::training::postproc::PostProcessor;
use crate::training::spec::TrainingSpec;
use crate::training::statistics::{StatsGatherer, TrainingReport};
use crate::types::{LabelId, Real, ThreadId};

struct ThreadLocalState {
    objective: Box<dyn crate::objective::Objective>,
    minimizer: Box<dyn crate::solver::Minimizer>,
    initializer: Box<dyn WeightsInitializer>,
    post: Box<dyn PostProcessor>,
    weight: Vec<Real>,
}

/// Trains every label in `spec.label_range()` and merges the result into a
/// single `Model`. One instance runs one `ParallelRunner::run` call.
pub struct TrainingTaskGenerator<S: TrainingSpec> {
    spec: S,
    model: Mutex<Box<dyn Model + Send + Sync>>,
    stats: StatsGatherer,
    per_thread: Vec<Mutex<Option<ThreadLocalState>>>,
}

impl<S: TrainingSpec> TrainingTaskGenerator<S> {
    pub fn new(spec: S) -> Self {
        let model = Mutex::new(spec.make_model());
        TrainingTaskGenerator {
            spec,
            model,
            stats: StatsGatherer::new(0),
            per_thread: Vec::new(),
        }
    }

    pub fn into_model(self) -> Box<dyn Model + Send + Sync> {
        self.model.into_inner().unwrap()
    }

    pub fn report(&self) -> TrainingReport {
        self.stats.report()
    }
}

impl<S: TrainingSpec> TaskGenerator for TrainingTaskGenerator<S> {
    fn num_tasks(&self) -> i64 {
        self.spec.label_range().len() as i64
    }

    fn prepare(&mut self, num_threads: i64, _chunk_size: i64) {
        let num_threads = num_threads.max(1) as usize;
        self.per_thread = (0..num_threads).map(|_| Mutex::new(None)).collect();
        self.stats = StatsGatherer::new(num_threads);
    }

    fn init_thread(&self, thread_id: ThreadId) {
        let objective = self.spec.make_objective();
        let num_weights = objective.num_weights();
        let state = ThreadLocalState {
            objective,
            minimizer: self.spec.make_minimizer(),
            initializer: self.spec.make_initializer(),
            post: self.spec.make_post_processor(),
            weight: vec![0.0; num_weights],
        };
        *self.per_thread[thread_id.to_index()].lock().unwrap() = Some(state);
    }

    fn run_tasks(&self, begin: i64, end: i64, thread_id: ThreadId) {
        let mut guard = self.per_thread[thread_id.to_index()].lock().unwrap();
        let state = guard.as_mut().expect("init_thread must run before run_tasks");

        for offset in begin..end {
            let label = LabelId::new(self.spec.label_range().begin + offset as usize);

            self.spec.update_objective(&mut *state.objective, label);
            self.spec.update_minimizer(&mut *state.minimizer, label);

            state.initializer.get_initial_weight(label, &mut state.weight, &*state.objective);
            let initial_loss = state.objective.value(&state.weight);

            let result = state.minimizer.minimize(&*state.objective, &mut state.weight);
            state.post.process(label, &mut state.weight, &result, &*state.objective);

            let num_positives = state.objective.get_label_ref().iter().filter(|&&y| y > 0.0).count();

            let error = {
                let mut model = self.model.lock().unwrap();
                model.set_weights_for_label(label, &state.weight).err().map(|e| e.to_string())
            };

            self.stats.record(
                thread_id,
                label,
                num_positives,
                result.iterations,
                initial_loss,
                result.final_value,
                result.converged && error.is_none(),
                error,
            );
        }
    }

    fn finalize(&mut self) {
        self.stats.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Dataset, FeatureMatrix, MultiLabelIncidence};
    use crate::parallel::ParallelRunner;
    use crate::training::spec::{DismecTraining, ModelKind};
    use crate::types::LabelRange;
    use ndarray::Array2;

    #[test]
    fn trains_every_label_and_reports_clean_run() {
        let features = FeatureMatrix::Dense(
            Array2::from_shape_vec((4, 2), vec![2.0, 0.0, 0.0, 2.0, -2.0, 0.0, 0.0, -2.0]).unwrap(),
        );
        let labels = MultiLabelIncidence::new(vec![vec![0, 1], vec![2, 3], vec![0]]);
        let dataset = Dataset::new(features, labels).unwrap();

        let spec = DismecTraining::new(dataset, LabelRange::new(0, 3), 1.0, false, 0.01, ModelKind::Dense);
        let mut generator = TrainingTaskGenerator::new(spec);

        let runner = ParallelRunner::new(2, 1);
        let result = runner.run(&mut generator, 0).unwrap();
        assert!(result.finished);

        let report = generator.report();
        assert_eq!(report.num_labels_trained, 3);
        assert_eq!(report.num_failed, 0);

        let model = generator.into_model();
        for label in 0..3 {
            assert!(model.weights_for_label(LabelId::new(label)).is_ok());
        }
    }
}
