// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Data preparation and evaluation reporting for AFib detection from HRV
//! features
//!
//! This crate provides:
//! - CSV loading of per-interval HRV features (SDNN, RMSSD, Poincaré SD1/SD2, ...)
//! - Quality filtering and z-score standardization
//! - SMOTE oversampling of the minority class
//! - Seeded train/test splitting
//! - A classifier boundary with majority, logistic and k-NN implementations
//! - Seeded random hyperparameter search
//! - Accuracy, ROC AUC, confusion matrix and per-class report
//! - A single-page PDF report and a reusable model artifact

pub mod artifact;
pub mod config;
pub mod datasets;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod raster;
pub mod report;
pub mod resample;
pub mod search;
pub mod split;

pub use artifact::{ModelArtifact, Prediction};
pub use config::{ExperimentConfig, Variant};
pub use datasets::{Dataset, FeatureColumn, FeatureRow, Label};
pub use error::{PipelineError, Result};
pub use metrics::{evaluate, ClassificationReport, ConfusionMatrix, EvaluationResult};
pub use models::{Classifier, ModelKind, TrainedModel};
pub use pipeline::{ExperimentPipeline, ExperimentResults};
pub use preprocess::{filter_quality, fit_normalize, NormalizedDataset, QualityThresholds, Standardizer};
pub use report::ReportRenderer;
pub use resample::{ResampledDataset, Smote};
pub use search::{Hyperparameters, RandomSearch, SearchOutcome, Trial};
pub use split::{train_test_split, Split};
