// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Persisted model artifact
//!
//! Bundles a fitted classifier with everything needed to apply it to a new
//! table: the quality thresholds, the fitted [`Standardizer`] and the
//! hyperparameters it was trained with.

use crate::config::Variant;
use crate::datasets::{Dataset, Label};
use crate::error::{PipelineError, Result};
use crate::metrics::EvaluationResult;
use crate::models::{Classifier, ModelKind, TrainedModel};
use crate::preprocess::{QualityThresholds, Standardizer};
use crate::search::Hyperparameters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Held-out scores recorded alongside the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtifactScores {
    pub accuracy: f64,
    pub roc_auc: f64,
    pub test_samples: usize,
}

impl From<&EvaluationResult> for ArtifactScores {
    fn from(result: &EvaluationResult) -> Self {
        Self {
            accuracy: result.accuracy,
            roc_auc: result.roc_auc,
            test_samples: result.confusion_matrix.total(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub variant: Variant,
    pub kind: ModelKind,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub label_column: String,
    pub thresholds: QualityThresholds,
    pub standardizer: Standardizer,
    pub hyperparameters: Hyperparameters,
    pub scores: Option<ArtifactScores>,
    pub model: TrainedModel,
}

/// One scored input row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Zero-based position in the input table
    pub row: usize,
    pub predicted: Label,
    /// Probability of the Afib class
    pub probability: f64,
    /// Known label, `None` for an unlabeled table
    pub actual: Option<Label>,
}

impl ModelArtifact {
    pub fn new(
        variant: Variant,
        kind: ModelKind,
        label_column: &str,
        thresholds: QualityThresholds,
        standardizer: Standardizer,
        hyperparameters: Hyperparameters,
        model: TrainedModel,
    ) -> Self {
        Self {
            variant,
            kind,
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: Utc::now(),
            label_column: label_column.to_string(),
            thresholds,
            standardizer,
            hyperparameters,
            scores: None,
            model,
        }
    }

    pub fn with_scores(mut self, result: &EvaluationResult) -> Self {
        self.scores = Some(ArtifactScores::from(result));
        self
    }

    /// Save as pretty-printed JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::artifact(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| PipelineError::artifact(path, e))?;
        std::fs::write(path, json).map_err(|e| PipelineError::artifact(path, e))?;
        tracing::info!("Model artifact saved to {}", path.display());
        Ok(())
    }

    /// Load and check that the stored shapes agree with each other
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::artifact(path, e))?;
        let artifact: Self = serde_json::from_str(&text).map_err(|e| PipelineError::artifact(path, e))?;
        artifact
            .check_shapes()
            .map_err(|reason| PipelineError::artifact(path, reason))?;
        Ok(artifact)
    }

    fn check_shapes(&self) -> std::result::Result<(), String> {
        let columns = self.standardizer.columns.len();
        if columns == 0 {
            return Err("standardizer has no feature columns".to_string());
        }
        if self.standardizer.mean.len() != columns || self.standardizer.scale.len() != columns {
            return Err(format!(
                "standardizer has {} columns but {} means and {} scales",
                columns,
                self.standardizer.mean.len(),
                self.standardizer.scale.len()
            ));
        }
        if self.standardizer.scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err("standardizer scale must be finite and non-zero".to_string());
        }
        match self.model.input_width() {
            Some(width) if width != columns => Err(format!(
                "model expects {} features but the standardizer produces {}",
                width, columns
            )),
            _ => Ok(()),
        }
    }

    /// Score every row of `dataset` that passes the stored quality thresholds
    ///
    /// Rows are standardized with the stored statistics; nothing is refit.
    pub fn predict(&self, dataset: &Dataset) -> Result<Vec<Prediction>> {
        self.check_shapes().map_err(PipelineError::InvalidInput)?;

        let kept: Vec<usize> = dataset
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| self.thresholds.accepts(row))
            .map(|(i, _)| i)
            .collect();

        if kept.len() < dataset.len() {
            tracing::info!(
                "{} of {} rows rejected by quality thresholds",
                dataset.len() - kept.len(),
                dataset.len()
            );
        }
        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<_> = kept.iter().map(|&i| dataset.rows[i].clone()).collect();
        let x = self.standardizer.transform(&rows);
        let probabilities = self.model.predict_proba(x.view());

        Ok(kept
            .iter()
            .zip(&rows)
            .zip(probabilities)
            .map(|((&row, source), p)| Prediction {
                row,
                predicted: if p[1] > p[0] { Label::Afib } else { Label::Normal },
                probability: p[1],
                actual: dataset.labeled.then_some(source.label),
            })
            .collect())
    }
}
