// src/io/mod.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk formats: NumPy `.npy` for dense matrices and models, and the
//! sparse/dense text formats used by the extreme-classification data
//! repositories for feature matrices, label incidence and prediction dumps.

pub mod numpy;
pub mod text;

pub use numpy::{read_npy, write_npy, DType};
pub use text::{
    read_dense_text, read_sparse_features, read_sparse_labels, read_sparse_prediction, write_dense_text,
    write_sparse_features, write_sparse_labels, write_sparse_prediction,
};
