// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Error types for the experiment pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort an experiment run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input file missing, unreadable, or lacking required columns
    #[error("Failed to load data from {path}: {reason}")]
    DataLoad { path: PathBuf, reason: String },

    /// Filtering removed every row
    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    /// Not enough samples to resample or split
    #[error("Insufficient samples: {0}")]
    InsufficientSamples(String),

    /// Metric cannot be computed for the given labels
    #[error("Metric undefined: {0}")]
    MetricUndefined(String),

    /// Report or intermediate image could not be written
    #[error("Failed to write report {path}: {reason}")]
    ReportWrite { path: PathBuf, reason: String },

    /// Configuration or hyperparameter value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Caller passed inconsistent inputs
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Model artifact could not be saved or loaded
    #[error("Model artifact error at {path}: {reason}")]
    Artifact { path: PathBuf, reason: String },
}

impl PipelineError {
    pub(crate) fn data_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::DataLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn report_write(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::ReportWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::Artifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
