// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Experiment configuration and per-variant presets

use crate::datasets::FeatureColumn;
use crate::error::{PipelineError, Result};
use crate::models::ModelKind;
use crate::preprocess::QualityThresholds;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// The three experiment profiles the pipeline was factored from
///
/// A variant fixes the data-preparation choices and the report name; the
/// learner is chosen separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    CnnLstm,
    GradientBoost,
    Resnet,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::CnnLstm, Variant::GradientBoost, Variant::Resnet];

    pub fn label_column(&self) -> &'static str {
        match self {
            Variant::CnnLstm | Variant::GradientBoost => "num_AFIB_annotations",
            Variant::Resnet => "has_AFIB",
        }
    }

    pub fn min_signal_quality(&self) -> f64 {
        match self {
            Variant::CnnLstm | Variant::GradientBoost => 0.3,
            Variant::Resnet => 0.5,
        }
    }

    pub fn feature_columns(&self) -> Vec<FeatureColumn> {
        match self {
            Variant::CnnLstm | Variant::GradientBoost => FeatureColumn::ALL.to_vec(),
            Variant::Resnet => vec![
                FeatureColumn::HrvSdnn,
                FeatureColumn::HrvRmssd,
                FeatureColumn::HrvMean,
                FeatureColumn::Cv,
            ],
        }
    }

    /// Suffix used in output file names
    pub fn report_tag(&self) -> &'static str {
        match self {
            Variant::CnnLstm => "CNN_LSTM",
            Variant::GradientBoost => "Gradient_Boosting",
            Variant::Resnet => "ResNet_optm",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Variant::CnnLstm => "cnn-lstm",
            Variant::GradientBoost => "gradient-boost",
            Variant::Resnet => "resnet",
        };
        f.write_str(name)
    }
}

impl FromStr for Variant {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "cnn-lstm" => Ok(Variant::CnnLstm),
            "gradient-boost" | "xgboost" => Ok(Variant::GradientBoost),
            "resnet" => Ok(Variant::Resnet),
            other => Err(PipelineError::InvalidConfig(format!("unknown variant '{}'", other))),
        }
    }
}

/// Configuration for one experiment run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub variant: Variant,
    /// Input CSV path
    pub input: PathBuf,
    pub label_column: String,
    pub feature_columns: Vec<FeatureColumn>,
    pub thresholds: QualityThresholds,
    /// Random seed for oversampling, splitting and search
    pub seed: u64,
    pub k_neighbors: usize,
    pub sampling_ratio: f64,
    pub test_fraction: f64,
    /// Share of the training split held back to score search trials
    pub validation_fraction: f64,
    pub model: ModelKind,
    pub n_trials: usize,
    /// Directory for the PDF report
    pub report_dir: PathBuf,
    /// Directory for the model artifact, `None` disables saving
    pub model_dir: Option<PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self::for_variant(Variant::CnnLstm)
    }
}

impl ExperimentConfig {
    pub fn for_variant(variant: Variant) -> Self {
        Self {
            variant,
            input: PathBuf::from("data/afdb_data.csv"),
            label_column: variant.label_column().to_string(),
            feature_columns: variant.feature_columns(),
            thresholds: QualityThresholds {
                min_signal_quality: variant.min_signal_quality(),
                ..Default::default()
            },
            seed: 42,
            k_neighbors: 5,
            sampling_ratio: 1.0,
            test_fraction: 0.2,
            validation_fraction: 0.2,
            model: ModelKind::Logistic,
            n_trials: 50,
            report_dir: PathBuf::from("reports"),
            model_dir: Some(PathBuf::from("models")),
        }
    }

    /// Load from a JSON file; missing fields take the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::InvalidConfig(format!("cannot read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| PipelineError::InvalidConfig(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.feature_columns.is_empty() {
            return Err(PipelineError::InvalidConfig("feature_columns is empty".to_string()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        if self.n_trials == 0 {
            return Err(PipelineError::InvalidConfig("n_trials must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        self.report_dir
            .join(format!("model_evaluation_{}.pdf", self.variant.report_tag()))
    }

    pub fn model_path(&self) -> Option<PathBuf> {
        self.model_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}_model.json", self.variant.report_tag())))
    }
}
