// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Reproducible AFib experiment pipeline
//!
//! Orchestrates:
//! - Dataset loading and quality filtering
//! - Standardization and SMOTE oversampling
//! - Seeded train/test split
//! - Hyperparameter search and final fit
//! - Held-out evaluation, PDF report and model artifact

use crate::artifact::ModelArtifact;
use crate::config::ExperimentConfig;
use crate::datasets::{Dataset, Label};
use crate::error::{PipelineError, Result};
use crate::metrics::{evaluate, ConfusionMatrix, EvaluationResult};
use crate::models::{Classifier, TrainedModel};
use crate::preprocess::{filter_quality, fit_normalize, Standardizer};
use crate::report::ReportRenderer;
use crate::resample::Smote;
use crate::search::{Hyperparameters, RandomSearch, SearchOutcome};
use crate::split::{train_test_split, Split};
use chrono::{DateTime, Utc};
use ndarray::s;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Row counts after each preparation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub loaded: usize,
    pub filtered: usize,
    pub resampled: usize,
    pub train: usize,
    pub test: usize,
    /// Class counts after resampling, indexed by label
    pub resampled_classes: [usize; 2],
}

/// Split plus the statistics needed to reproduce its features
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub counts: StageCounts,
    pub standardizer: Standardizer,
    pub split: Split,
}

/// Complete results of one experiment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub config: ExperimentConfig,
    pub counts: StageCounts,
    pub search: SearchOutcome,
    pub evaluation: EvaluationResult,
    pub report_path: PathBuf,
    pub artifact_path: Option<PathBuf>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl ExperimentResults {
    /// Console summary
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Variant: {} ({})\n", self.config.variant, self.config.model));
        out.push_str(&format!(
            "Rows: loaded={} filtered={} resampled={} train={} test={}\n",
            self.counts.loaded, self.counts.filtered, self.counts.resampled, self.counts.train, self.counts.test
        ));
        out.push_str(&format!(
            "Best trial: {} of {} (validation accuracy {:.4}) {}\n\n",
            self.search.best_trial,
            self.search.trials.len(),
            self.search.best_score,
            self.search.best_params
        ));
        out.push_str(&self.evaluation.format());
        out
    }
}

/// Main experiment pipeline
pub struct ExperimentPipeline {
    config: ExperimentConfig,
    renderer: ReportRenderer,
}

impl ExperimentPipeline {
    pub fn new(config: ExperimentConfig) -> Self {
        let renderer = ReportRenderer::new().with_caption(&format!(
            "{} / {}",
            config.variant.report_tag(),
            config.model
        ));
        Self { config, renderer }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Load the configured input table and run every stage
    pub fn run(&self) -> Result<ExperimentResults> {
        self.config.validate()?;
        tracing::info!("Loading {}", self.config.input.display());
        let dataset = Dataset::load_csv(&self.config.input, &self.config.label_column)?;
        self.run_on(&dataset)
    }

    /// Filter, normalize, resample and split `dataset`
    pub fn prepare(&self, dataset: &Dataset) -> Result<PreparedData> {
        self.config.validate()?;
        let config = &self.config;

        let filtered = filter_quality(dataset, &config.thresholds);
        let normalized = fit_normalize(&filtered, &config.feature_columns)?;

        let smote = Smote {
            k_neighbors: config.k_neighbors,
            sampling_ratio: config.sampling_ratio,
            seed: config.seed,
        };
        let resampled = smote.fit_resample(&normalized)?;
        let split = train_test_split(&resampled, config.test_fraction, config.seed)?;

        let counts = StageCounts {
            loaded: dataset.len(),
            filtered: filtered.len(),
            resampled: resampled.len(),
            train: split.y_train.len(),
            test: split.y_test.len(),
            resampled_classes: resampled.class_counts(),
        };

        Ok(PreparedData {
            counts,
            standardizer: normalized.standardizer,
            split,
        })
    }

    /// Search hyperparameters on a validation slice of the train split
    ///
    /// The last `validation_fraction` of the (already shuffled) train rows
    /// score each trial; the test rows are never seen.
    pub fn search(&self, split: &Split) -> Result<SearchOutcome> {
        let kind = self.config.model;
        let n_train = split.y_train.len();
        let n_val = (n_train as f64 * self.config.validation_fraction).ceil() as usize;
        if n_val == 0 || n_val >= n_train {
            return Err(PipelineError::InsufficientSamples(format!(
                "cannot hold out a validation slice from {} train rows",
                n_train
            )));
        }
        let n_fit = n_train - n_val;

        let x_fit = split.x_train.slice(s![..n_fit, ..]);
        let x_val = split.x_train.slice(s![n_fit.., ..]);
        let (y_fit, y_val) = split.y_train.split_at(n_fit);

        tracing::info!(
            "Searching {} hyperparameters over {} trials ({} fit / {} validation rows)",
            kind,
            self.config.n_trials,
            n_fit,
            n_val
        );

        RandomSearch::new(self.config.n_trials, self.config.seed).optimize(|trial| {
            let params = kind.suggest(trial);
            let model = match kind.train(x_fit, y_fit, &params) {
                Ok(model) => model,
                Err(PipelineError::InvalidConfig(reason)) => {
                    tracing::warn!("Trial {} rejected: {}", trial.number(), reason);
                    return Ok(f64::NAN);
                }
                Err(e) => return Err(e),
            };
            let predictions = model.predict(x_val);
            Ok(ConfusionMatrix::from_predictions(&predictions, y_val).accuracy())
        })
    }

    /// Fit on the full train split and evaluate on the test split
    pub fn fit_and_evaluate(&self, split: &Split, params: &Hyperparameters) -> Result<(TrainedModel, EvaluationResult)> {
        let model = self.config.model.train(split.x_train.view(), &split.y_train, params)?;

        let probabilities: Vec<f64> = model
            .predict_proba(split.x_test.view())
            .iter()
            .map(|p| p[1])
            .collect();
        let predictions: Vec<Label> = model.predict(split.x_test.view());

        let evaluation = evaluate(&predictions, &probabilities, &split.y_test)?;
        tracing::info!(
            "{} test accuracy {:.4}, ROC AUC {:.4}",
            model.name(),
            evaluation.accuracy,
            evaluation.roc_auc
        );
        Ok((model, evaluation))
    }

    /// Run every stage on an already loaded table
    pub fn run_on(&self, dataset: &Dataset) -> Result<ExperimentResults> {
        let prepared = self.prepare(dataset)?;
        let search = self.search(&prepared.split)?;
        let (model, evaluation) = self.fit_and_evaluate(&prepared.split, &search.best_params)?;

        let report_path = self.config.report_path();
        self.renderer.render(&evaluation, &report_path)?;

        let artifact_path = match self.config.model_path() {
            Some(path) => {
                let artifact = ModelArtifact::new(
                    self.config.variant,
                    self.config.model,
                    &self.config.label_column,
                    self.config.thresholds,
                    prepared.standardizer,
                    search.best_params.clone(),
                    model,
                )
                .with_scores(&evaluation);
                artifact.save(&path)?;
                Some(path)
            }
            None => None,
        };

        Ok(ExperimentResults {
            config: self.config.clone(),
            counts: prepared.counts,
            search,
            evaluation,
            report_path,
            artifact_path,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Variant;
    use crate::models::ModelKind;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, model: ModelKind, n_trials: usize) -> ExperimentConfig {
        ExperimentConfig {
            model,
            n_trials,
            report_dir: dir.path().join("reports"),
            model_dir: Some(dir.path().join("models")),
            ..ExperimentConfig::for_variant(Variant::Resnet)
        }
    }

    #[test]
    fn test_majority_end_to_end() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExperimentPipeline::new(config_in(&dir, ModelKind::Majority, 1));
        let dataset = Dataset::synthetic(20, 80, 42);

        let results = pipeline.run_on(&dataset).unwrap();

        assert_eq!(results.counts.loaded, 100);
        assert_eq!(results.counts.filtered, 100);
        assert_eq!(results.counts.resampled, 160);
        assert_eq!(results.counts.resampled_classes, [80, 80]);
        assert_eq!(results.counts.train, 128);
        assert_eq!(results.counts.test, 32);

        // A constant predictor fills a single column of the matrix
        let cm = &results.evaluation.confusion_matrix;
        assert_eq!(cm.total(), 32);
        let predicted: Vec<Label> = Label::ALL.into_iter().filter(|l| cm.predicted(*l) > 0).collect();
        assert_eq!(predicted.len(), 1);
        let expected = cm.support(predicted[0]) as f64 / 32.0;
        assert!((results.evaluation.accuracy - expected).abs() < 1e-12);
        assert!((results.evaluation.roc_auc - 0.5).abs() < 1e-12);

        assert!(results.report_path.ends_with("model_evaluation_ResNet_optm.pdf"));
        assert!(std::fs::metadata(&results.report_path).unwrap().len() > 0);
        let leftover: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
            .collect();
        assert!(leftover.is_empty(), "scratch images left behind: {:?}", leftover);

        let artifact = results.artifact_path.as_ref().unwrap();
        assert!(artifact.exists());
        assert_eq!(ModelArtifact::load(artifact).unwrap().kind, ModelKind::Majority);
    }

    #[test]
    fn test_majority_on_balanced_split() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExperimentPipeline::new(config_in(&dir, ModelKind::Majority, 1));
        let labels = |n_normal: usize, n_afib: usize| -> Vec<Label> {
            std::iter::repeat(Label::Normal)
                .take(n_normal)
                .chain(std::iter::repeat(Label::Afib).take(n_afib))
                .collect()
        };
        // 160 resampled rows (80/80) split 128 train (64/64) / 32 test (16/16)
        let split = Split {
            x_train: Array2::zeros((128, 4)),
            x_test: Array2::zeros((32, 4)),
            y_train: labels(64, 64),
            y_test: labels(16, 16),
            train_indices: (0..128).collect(),
            test_indices: (128..160).collect(),
        };

        let (model, evaluation) = pipeline.fit_and_evaluate(&split, &Hyperparameters::new()).unwrap();

        // The training tie goes to class 0
        assert!(model.predict(split.x_test.view()).iter().all(|l| *l == Label::Normal));
        assert_eq!(evaluation.confusion_matrix.counts, [[16, 0], [16, 0]]);
        assert_eq!(evaluation.accuracy, 0.5);
        assert_eq!(evaluation.roc_auc, 0.5);

        let output = dir.path().join("balanced.pdf");
        pipeline.renderer.render(&evaluation, &output).unwrap();
        assert!(std::fs::metadata(&output).unwrap().len() > 0);
    }

    #[test]
    fn test_logistic_separates_synthetic() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExperimentPipeline::new(config_in(&dir, ModelKind::Logistic, 5));
        let dataset = Dataset::synthetic(40, 160, 7);

        let results = pipeline.run_on(&dataset).unwrap();

        assert_eq!(results.search.trials.len(), 5);
        assert!(results.evaluation.accuracy > 0.9, "accuracy {}", results.evaluation.accuracy);
        assert!(results.evaluation.roc_auc > 0.9);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let dir = TempDir::new().unwrap();
        let config = ExperimentConfig {
            model_dir: None,
            ..config_in(&dir, ModelKind::Knn, 4)
        };
        let dataset = Dataset::synthetic(25, 75, 3);

        let a = ExperimentPipeline::new(config.clone()).run_on(&dataset).unwrap();
        let b = ExperimentPipeline::new(config).run_on(&dataset).unwrap();

        assert_eq!(a.search.best_params, b.search.best_params);
        assert_eq!(a.evaluation.confusion_matrix, b.evaluation.confusion_matrix);
        assert!(a.artifact_path.is_none());
    }

    #[test]
    fn test_too_few_minority_rows() {
        let dir = TempDir::new().unwrap();
        let pipeline = ExperimentPipeline::new(config_in(&dir, ModelKind::Majority, 1));
        let err = pipeline.run_on(&Dataset::synthetic(3, 50, 1)).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientSamples(_)));
    }

    #[test]
    fn test_everything_filtered() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir, ModelKind::Majority, 1);
        config.thresholds.min_signal_quality = 2.0;

        let err = ExperimentPipeline::new(config)
            .run_on(&Dataset::synthetic(20, 20, 1))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDataset(_)));
        assert!(!dir.path().join("reports").exists());
    }

    #[test]
    fn test_missing_input_file() {
        let dir = TempDir::new().unwrap();
        let config = ExperimentConfig {
            input: dir.path().join("absent.csv"),
            ..config_in(&dir, ModelKind::Majority, 1)
        };
        let err = ExperimentPipeline::new(config).run().unwrap_err();
        assert!(matches!(err, PipelineError::DataLoad { .. }));
    }
}
