// src/training/mod.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Training: per-label objective/minimizer/initializer/post-processor
//! assembly (`spec`), weight initialization strategies (`initializer`),
//! post-processing (`postproc`), per-thread statistics (`statistics`) and
//! the `TaskGenerator` that drives one label per task (`task`).

pub mod initializer;
pub mod postproc;
pub mod spec;
pub mod statistics;
pub mod task;

pub use spec::{CascadeTraining, DismecTraining, InitKind, ModelKind, PostKind, TrainingSpec};
pub use statistics::TrainingReport;
pub use task::TrainingTaskGenerator;
