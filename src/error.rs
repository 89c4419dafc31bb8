// src/error.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed error kinds for the training/prediction engine.
//!
//! Parsing and I/O errors surface to the CLI and abort the whole run. Shape
//! and config errors are checked before any worker starts. Per-worker
//! training errors are recorded against the failing label instead (see
//! `training::statistics`) so one bad label does not abort the run.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DismecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error at {context}: {message}")]
    Parse { context: String, message: String },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("numa topology error: {0}")]
    Topology(String),
}

impl DismecError {
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        DismecError::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        DismecError::Shape(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        DismecError::Config(message.into())
    }

    pub fn resource(message: impl Into<String>) -> Self {
        DismecError::Resource(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DismecError>;
