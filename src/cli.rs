// src/cli.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line surface: `train` and `predict`. Exits `0` on success; I/O
//! and parse errors abort the whole run, while per-label training errors
//! are recorded against the label and surfaced in the final report instead
//! of aborting (see `training::statistics`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::data::{Dataset, FeatureMatrix};
use crate::error::{DismecError, Result};
use crate::io::{read_dense_text, read_sparse_labels, write_sparse_prediction};
use crate::model::Model;
use crate::parallel::ParallelRunner;
use crate::prediction::TopKPredictor;
use crate::training::spec::{DismecTraining, InitKind, ModelKind, PostKind, TrainingSpec};
use crate::training::task::TrainingTaskGenerator;
use crate::types::LabelRange;

#[derive(Parser, Debug)]
#[command(name = "dismec", about = "NUMA-aware one-vs-all training and prediction for extreme multi-label classification")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Train(TrainArgs),
    Predict(PredictArgs),
}

#[derive(Parser, Debug)]
pub struct TrainArgs {
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub labels: Option<PathBuf>,
    #[arg(long = "model-out")]
    pub model_out: PathBuf,
    #[arg(long)]
    pub threads: Option<i64>,
    #[arg(long)]
    pub chunk: Option<i64>,
    #[arg(long = "time-limit")]
    pub time_limit: Option<u64>,
    #[arg(long = "label-range", value_parser = parse_label_range)]
    pub label_range: Option<(usize, usize)>,
    #[arg(long, default_value_t = 0.01)]
    pub epsilon: f64,
    #[arg(long = "weights-init", default_value = "zero")]
    pub weights_init: String,
    #[arg(long)]
    pub post: Option<String>,
}

#[derive(Parser, Debug)]
pub struct PredictArgs {
    #[arg(long)]
    pub model: PathBuf,
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub output: PathBuf,
    #[arg(long, default_value_t = 5)]
    pub topk: usize,
    #[arg(long)]
    pub threads: Option<i64>,
}

fn parse_label_range(s: &str) -> std::result::Result<(usize, usize), String> {
    let (a, b) = s.split_once(':').ok_or_else(|| format!("expected a:b, got {s}"))?;
    let a: usize = a.parse().map_err(|_| format!("invalid range start: {a}"))?;
    let b: usize = b.parse().map_err(|_| format!("invalid range end: {b}"))?;
    Ok((a, b))
}

fn parse_post_kind(spec: &str) -> Result<PostKind> {
    if let Some(eps) = spec.strip_prefix("cull:") {
        let eps: f64 = eps.parse().map_err(|_| DismecError::config(format!("invalid culling epsilon: {eps}")))?;
        return Ok(PostKind::Culling(eps));
    }
    if let Some(tol) = spec.strip_prefix("sparsify:") {
        let tol: f64 = tol.parse().map_err(|_| DismecError::config(format!("invalid sparsify tolerance: {tol}")))?;
        return Ok(PostKind::Sparsify(tol));
    }
    if spec == "reorder" {
        return Err(DismecError::config("reorder post-processing requires a feature permutation, not available from the CLI"));
    }
    Err(DismecError::config(format!("unknown post-processor: {spec}")))
}

pub fn run_train(args: TrainArgs) -> Result<()> {
    let labels_path = args
        .labels
        .as_ref()
        .ok_or_else(|| DismecError::config("--labels is required for training"))?;
    let features = read_dense_text(&args.input)?;
    let incidence = read_sparse_labels(labels_path)?;
    let mut dataset = Dataset::new(FeatureMatrix::Dense(features), incidence)?;
    let (begin, end) = args.label_range.unwrap_or((0, dataset.num_labels()));
    dataset.select_labels(begin, end);
    let label_range = LabelRange::new(begin, begin + dataset.num_labels());

    let mut training = DismecTraining::new(dataset, label_range, 1.0, true, args.epsilon, ModelKind::Dense);
    if let Some(post) = &args.post {
        training = training.with_post(parse_post_kind(post)?);
    }

    let init_kind = match args.weights_init.as_str() {
        "zero" => InitKind::Zero,
        "const" => InitKind::Constant(vec![0.0; training.dataset().num_features() + 1]),
        "mean" => InitKind::Mean(1.0),
        "pretrained" => return Err(DismecError::config("--weights-init pretrained requires a model path, not available from this CLI surface")),
        other => return Err(DismecError::config(format!("unknown --weights-init value: {other}"))),
    };
    training = training.with_initializer(init_kind);

    let mut generator = TrainingTaskGenerator::new(training);

    let mut runner = ParallelRunner::new(args.threads.unwrap_or(-1), args.chunk.unwrap_or(64));
    if let Some(secs) = args.time_limit {
        runner.set_time_limit(Some(Duration::from_secs(secs)));
    }

    let result = runner.run(&mut generator, 0)?;
    let report = generator.report();

    tracing::info!(
        "trained {} labels ({} failed) in {:.2}s",
        report.num_labels_trained,
        report.num_failed,
        result.wall_time.as_secs_f64()
    );

    let model = generator.into_model();
    let report_path = args.model_out.with_extension("report.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(&report).map_err(|e| DismecError::config(e.to_string()))?)?;

    write_model(&args.model_out, model.as_ref())?;

    if !result.finished {
        return Err(DismecError::resource("training did not finish within the time limit"));
    }
    Ok(())
}

pub fn run_predict(args: PredictArgs) -> Result<()> {
    let features = read_dense_text(&args.input)?;
    let num_examples = features.nrows();
    let model = read_model(&args.model)?;

    let features = Arc::new(FeatureMatrix::Dense(features));
    let mut predictor = TopKPredictor::new(features, args.topk);
    predictor.add_shard(Arc::from(model));

    let runner = ParallelRunner::new(args.threads.unwrap_or(-1), 64);
    runner.run(&mut predictor, 0)?;

    let predictions: Vec<Vec<(usize, crate::types::Real)>> = (0..num_examples)
        .map(|example| predictor.results_for(example).into_iter().map(|h| (h.label, h.score)).collect())
        .collect();
    write_sparse_prediction(&args.output, &predictions)
}

fn write_model(path: &PathBuf, model: &dyn Model) -> Result<()> {
    let num_labels = model.label_range().len();
    let num_weights = model.num_weights();
    let mut matrix = ndarray::Array2::zeros((num_labels, num_weights));
    for local in 0..num_labels {
        let label = crate::types::LabelId::new(model.label_range().begin + local);
        let weights = model.weights_for_label(label)?;
        matrix.row_mut(local).assign(&ndarray::ArrayView1::from(&weights));
    }
    crate::io::numpy::write_npy(path, &matrix)
}

fn read_model(path: &PathBuf) -> Result<Box<dyn Model + Send + Sync>> {
    let array = crate::io::numpy::read_npy(path)?.to_array2()?;
    let num_labels = array.nrows();
    let num_weights = array.ncols();
    let mut model = crate::model::DenseModel::new(LabelRange::new(0, num_labels), num_weights - 1, true);
    for label in 0..num_labels {
        model.set_weights_for_label(crate::types::LabelId::new(label), array.row(label).as_slice().unwrap())?;
    }
    Ok(Box::new(model))
}
