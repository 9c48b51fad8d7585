// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Quality filtering and feature standardization

use crate::datasets::{Dataset, FeatureColumn, FeatureRow, Label};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Row-level quality limits applied before normalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// Upper bound on SDNN (ms)
    pub max_sdnn: f64,
    /// Upper bound on RMSSD (ms)
    pub max_rmssd: f64,
    /// Upper bound on coefficient of variation
    pub max_cv: f64,
    /// Lower bound on signal quality
    pub min_signal_quality: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_sdnn: 500.0,
            max_rmssd: 500.0,
            max_cv: 0.5,
            min_signal_quality: 0.3,
        }
    }
}

impl QualityThresholds {
    /// NaN in any checked field fails the comparison and rejects the row
    pub fn accepts(&self, row: &FeatureRow) -> bool {
        row.hrv_sdnn <= self.max_sdnn
            && row.hrv_rmssd <= self.max_rmssd
            && row.cv <= self.max_cv
            && row.signal_quality >= self.min_signal_quality
    }
}

/// Drop every row that violates any threshold
pub fn filter_quality(dataset: &Dataset, thresholds: &QualityThresholds) -> Dataset {
    let rows: Vec<FeatureRow> = dataset
        .rows
        .iter()
        .filter(|row| thresholds.accepts(row))
        .cloned()
        .collect();

    tracing::info!(
        "Quality filter kept {} of {} rows",
        rows.len(),
        dataset.rows.len()
    );

    Dataset {
        labeled: dataset.labeled,
        ..Dataset::from_rows(&dataset.label_column, rows)
    }
}

/// Per-column mean and scale fit on the filtered training table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub columns: Vec<FeatureColumn>,
    pub mean: Array1<f64>,
    /// Population standard deviation, 1.0 for constant columns
    pub scale: Array1<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[FeatureRow], columns: &[FeatureColumn]) -> Result<Self> {
        if columns.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "no feature columns selected for normalization".to_string(),
            ));
        }
        let raw = Self::select(rows, columns);
        let mean = raw
            .mean_axis(Axis(0))
            .ok_or_else(|| PipelineError::EmptyDataset("no rows left to fit normalization".to_string()))?;
        let scale = raw
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });

        Ok(Self {
            columns: columns.to_vec(),
            mean,
            scale,
        })
    }

    /// Apply the stored statistics without refitting
    pub fn transform(&self, rows: &[FeatureRow]) -> Array2<f64> {
        let mut raw = Self::select(rows, &self.columns);
        raw -= &self.mean;
        raw /= &self.scale;
        raw
    }

    fn select(rows: &[FeatureRow], columns: &[FeatureColumn]) -> Array2<f64> {
        Array2::from_shape_fn((rows.len(), columns.len()), |(i, j)| columns[j].value(&rows[i]))
    }
}

/// Standardized feature matrix with its labels and fitted statistics
#[derive(Debug, Clone)]
pub struct NormalizedDataset {
    pub features: Array2<f64>,
    pub labels: Vec<Label>,
    pub standardizer: Standardizer,
}

/// Fit the standardizer on `dataset` and transform it
pub fn fit_normalize(dataset: &Dataset, columns: &[FeatureColumn]) -> Result<NormalizedDataset> {
    if dataset.is_empty() {
        return Err(PipelineError::EmptyDataset(
            "quality filtering removed every row".to_string(),
        ));
    }

    let standardizer = Standardizer::fit(&dataset.rows, columns)?;
    let features = standardizer.transform(&dataset.rows);
    let labels = dataset.rows.iter().map(|r| r.label).collect();

    tracing::info!(
        "Normalized {} rows over columns [{}]",
        dataset.len(),
        columns.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
    );

    Ok(NormalizedDataset {
        features,
        labels,
        standardizer,
    })
}
