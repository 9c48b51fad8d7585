// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! HRV feature table loading for AFib classification experiments

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Binary label for AFib detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    /// No atrial fibrillation in the interval
    Normal,
    /// Atrial fibrillation annotated in the interval
    Afib,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Normal, Label::Afib];

    /// Class index used for matrices and probability columns
    pub fn index(&self) -> usize {
        match self {
            Label::Normal => 0,
            Label::Afib => 1,
        }
    }

    pub fn from_index(index: usize) -> Self {
        if index == 1 {
            Label::Afib
        } else {
            Label::Normal
        }
    }

    /// Any positive annotation count marks the interval as AFib
    pub fn from_value(value: f64) -> Self {
        if value > 0.0 {
            Label::Afib
        } else {
            Label::Normal
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Feature columns available for normalization and training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    HrvSdnn,
    HrvRmssd,
    HrvMean,
    Cv,
    HeartRateStd,
    HeartRateMean,
    Sd1,
    Sd2,
}

impl FeatureColumn {
    pub const ALL: [FeatureColumn; 8] = [
        FeatureColumn::HrvSdnn,
        FeatureColumn::HrvRmssd,
        FeatureColumn::HrvMean,
        FeatureColumn::Cv,
        FeatureColumn::HeartRateStd,
        FeatureColumn::HeartRateMean,
        FeatureColumn::Sd1,
        FeatureColumn::Sd2,
    ];

    /// Column header as it appears in the input table
    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::HrvSdnn => "hrv_sdnn",
            FeatureColumn::HrvRmssd => "hrv_rmssd",
            FeatureColumn::HrvMean => "hrv_mean",
            FeatureColumn::Cv => "cv",
            FeatureColumn::HeartRateStd => "heart_rate_std",
            FeatureColumn::HeartRateMean => "heart_rate_mean",
            FeatureColumn::Sd1 => "sd1",
            FeatureColumn::Sd2 => "sd2",
        }
    }

    pub fn value(&self, row: &FeatureRow) -> f64 {
        match self {
            FeatureColumn::HrvSdnn => row.hrv_sdnn,
            FeatureColumn::HrvRmssd => row.hrv_rmssd,
            FeatureColumn::HrvMean => row.hrv_mean,
            FeatureColumn::Cv => row.cv,
            FeatureColumn::HeartRateStd => row.heart_rate_std,
            FeatureColumn::HeartRateMean => row.heart_rate_mean,
            FeatureColumn::Sd1 => row.sd1,
            FeatureColumn::Sd2 => row.sd2,
        }
    }
}

impl fmt::Display for FeatureColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One subject-interval record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Standard deviation of NN intervals (ms)
    pub hrv_sdnn: f64,
    /// Root mean square of successive differences (ms)
    pub hrv_rmssd: f64,
    /// Mean NN interval (ms)
    pub hrv_mean: f64,
    /// Coefficient of variation of NN intervals
    pub cv: f64,
    pub heart_rate_std: f64,
    pub heart_rate_mean: f64,
    /// Poincaré short-axis spread (ms)
    pub sd1: f64,
    /// Poincaré long-axis spread (ms)
    pub sd2: f64,
    /// Signal quality score in [0, 1]
    pub signal_quality: f64,
    /// Placeholder `Normal` when the table was loaded without labels
    pub label: Label,
}

/// An ordered table of feature rows sharing one schema
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Name of the column the labels were read from
    pub label_column: String,
    pub rows: Vec<FeatureRow>,
    /// False when the label column was absent from the source table
    pub labeled: bool,
}

const SIGNAL_QUALITY: &str = "signal_quality";

impl Dataset {
    pub fn from_rows(label_column: &str, rows: Vec<FeatureRow>) -> Self {
        Self {
            label_column: label_column.to_string(),
            rows,
            labeled: true,
        }
    }

    /// Load a delimited table with a header row
    ///
    /// All eight feature columns, `signal_quality` and `label_column` must be
    /// present. Other columns are ignored. Every required cell must be a
    /// finite number.
    pub fn load_csv(path: &Path, label_column: &str) -> Result<Self> {
        Self::read_csv(path, label_column, true)
    }

    /// Like [`Dataset::load_csv`], but a missing label column yields an
    /// unlabeled dataset instead of an error
    pub fn load_features_csv(path: &Path, label_column: &str) -> Result<Self> {
        Self::read_csv(path, label_column, false)
    }

    fn read_csv(path: &Path, label_column: &str, require_label: bool) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::data_load(path, "file does not exist"));
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| PipelineError::data_load(path, e))?;

        let headers = reader
            .headers()
            .map_err(|e| PipelineError::data_load(path, e))?
            .clone();

        let find = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| PipelineError::data_load(path, format!("missing required column '{}'", name)))
        };

        let feature_idx: Vec<usize> = FeatureColumn::ALL
            .iter()
            .map(|c| find(c.name()))
            .collect::<Result<_>>()?;
        let quality_idx = find(SIGNAL_QUALITY)?;
        let label_idx = match find(label_column) {
            Ok(idx) => Some(idx),
            Err(_) if !require_label => {
                tracing::info!("No '{}' column in {}, reading features only", label_column, path.display());
                None
            }
            Err(e) => return Err(e),
        };

        let mut rows = Vec::new();

        for (idx, result) in reader.records().enumerate() {
            // Header is line 1, first record is line 2
            let line = idx + 2;
            let record = result.map_err(|e| PipelineError::data_load(path, format!("line {}: {}", line, e)))?;

            let cell = |col: usize, name: &str| -> Result<f64> {
                let raw = record.get(col).unwrap_or("");
                let value = raw.parse::<f64>().map_err(|_| {
                    PipelineError::data_load(
                        path,
                        format!("line {}: column '{}' is not numeric ({:?})", line, name, raw),
                    )
                })?;
                // "nan" and "inf" parse as f64 but would poison the column statistics
                if !value.is_finite() {
                    return Err(PipelineError::data_load(
                        path,
                        format!("line {}: column '{}' is not finite ({:?})", line, name, raw),
                    ));
                }
                Ok(value)
            };

            let mut values = [0.0; 8];
            for (slot, (column, col)) in values.iter_mut().zip(FeatureColumn::ALL.iter().zip(&feature_idx)) {
                *slot = cell(*col, column.name())?;
            }

            rows.push(FeatureRow {
                hrv_sdnn: values[0],
                hrv_rmssd: values[1],
                hrv_mean: values[2],
                cv: values[3],
                heart_rate_std: values[4],
                heart_rate_mean: values[5],
                sd1: values[6],
                sd2: values[7],
                signal_quality: cell(quality_idx, SIGNAL_QUALITY)?,
                label: match label_idx {
                    Some(idx) => Label::from_value(cell(idx, label_column)?),
                    None => Label::Normal,
                },
            });
        }

        tracing::debug!("Read {} rows from {}", rows.len(), path.display());

        Ok(Self {
            labeled: label_idx.is_some(),
            ..Self::from_rows(label_column, rows)
        })
    }

    /// Generate a reproducible dataset whose rows all pass the default
    /// quality thresholds
    pub fn synthetic(n_positive: usize, n_negative: usize, seed: u64) -> Self {
        use rand::seq::SliceRandom;
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha8Rng;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut labels: Vec<Label> = std::iter::repeat(Label::Afib)
            .take(n_positive)
            .chain(std::iter::repeat(Label::Normal).take(n_negative))
            .collect();
        labels.shuffle(&mut rng);

        let rows = labels
            .into_iter()
            .map(|label| match label {
                // Irregular rhythm: high beat-to-beat variability
                Label::Afib => FeatureRow {
                    hrv_sdnn: rng.gen_range(80.0..200.0),
                    hrv_rmssd: rng.gen_range(80.0..220.0),
                    hrv_mean: rng.gen_range(450.0..850.0),
                    cv: rng.gen_range(0.12..0.35),
                    heart_rate_std: rng.gen_range(8.0..22.0),
                    heart_rate_mean: rng.gen_range(75.0..135.0),
                    sd1: rng.gen_range(60.0..160.0),
                    sd2: rng.gen_range(80.0..200.0),
                    signal_quality: rng.gen_range(0.5..1.0),
                    label,
                },
                Label::Normal => FeatureRow {
                    hrv_sdnn: rng.gen_range(20.0..95.0),
                    hrv_rmssd: rng.gen_range(15.0..75.0),
                    hrv_mean: rng.gen_range(650.0..1100.0),
                    cv: rng.gen_range(0.02..0.13),
                    heart_rate_std: rng.gen_range(2.0..9.0),
                    heart_rate_mean: rng.gen_range(55.0..92.0),
                    sd1: rng.gen_range(10.0..55.0),
                    sd2: rng.gen_range(30.0..110.0),
                    signal_quality: rng.gen_range(0.5..1.0),
                    label,
                },
            })
            .collect();

        Self::from_rows("has_AFIB", rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count rows per class
    pub fn label_distribution(&self) -> HashMap<Label, usize> {
        let mut dist = HashMap::new();
        for row in &self.rows {
            *dist.entry(row.label).or_insert(0) += 1;
        }
        dist
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "subject,hrv_sdnn,hrv_rmssd,hrv_mean,cv,heart_rate_std,heart_rate_mean,sd1,sd2,signal_quality,num_AFIB_annotations";

    fn write_csv(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        write!(file, "{}", body).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_csv() {
        let file = write_csv(
            "04015,50.0,40.0,800.0,0.06,4.0,75.0,28.0,60.0,0.9,0\n\
             04043,150.0,170.0,600.0,0.25,15.0,100.0,120.0,140.0,0.7,3\n",
        );

        let dataset = Dataset::load_csv(file.path(), "num_AFIB_annotations").unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.label_column, "num_AFIB_annotations");
        assert_eq!(dataset.rows[0].label, Label::Normal);
        assert_eq!(dataset.rows[1].label, Label::Afib);
        assert!((dataset.rows[1].sd2 - 140.0).abs() < 1e-12);
        assert!((dataset.rows[0].signal_quality - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_load_csv_missing_file() {
        let err = Dataset::load_csv(Path::new("/nonexistent/afdb_data.csv"), "has_AFIB").unwrap_err();
        assert!(matches!(err, PipelineError::DataLoad { .. }));
    }

    #[test]
    fn test_load_csv_missing_label_column() {
        let file = write_csv("04015,50.0,40.0,800.0,0.06,4.0,75.0,28.0,60.0,0.9,0\n");

        let err = Dataset::load_csv(file.path(), "has_AFIB").unwrap_err();
        match err {
            PipelineError::DataLoad { reason, .. } => assert!(reason.contains("has_AFIB")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_csv_non_numeric_cell() {
        let file = write_csv("04015,fifty,40.0,800.0,0.06,4.0,75.0,28.0,60.0,0.9,0\n");

        let err = Dataset::load_csv(file.path(), "num_AFIB_annotations").unwrap_err();
        match err {
            PipelineError::DataLoad { reason, .. } => {
                assert!(reason.contains("hrv_sdnn"));
                assert!(reason.contains("line 2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_csv_rejects_non_finite_cells() {
        // sd1 is not covered by the quality filter
        let file = write_csv("04015,50.0,40.0,800.0,0.06,4.0,75.0,NaN,60.0,0.9,0\n");
        let err = Dataset::load_csv(file.path(), "num_AFIB_annotations").unwrap_err();
        match err {
            PipelineError::DataLoad { reason, .. } => assert!(reason.contains("sd1")),
            other => panic!("unexpected error: {other}"),
        }

        let file = write_csv("04015,50.0,40.0,800.0,0.06,4.0,75.0,28.0,60.0,0.9,nan\n");
        let err = Dataset::load_csv(file.path(), "num_AFIB_annotations").unwrap_err();
        match err {
            PipelineError::DataLoad { reason, .. } => assert!(reason.contains("num_AFIB_annotations")),
            other => panic!("unexpected error: {other}"),
        }

        let file = write_csv("04015,inf,40.0,800.0,0.06,4.0,75.0,28.0,60.0,0.9,0\n");
        assert!(Dataset::load_csv(file.path(), "num_AFIB_annotations").is_err());
    }

    #[test]
    fn test_load_features_without_label_column() {
        let file = write_csv("04015,50.0,40.0,800.0,0.06,4.0,75.0,28.0,60.0,0.9,0\n");

        let labeled = Dataset::load_features_csv(file.path(), "num_AFIB_annotations").unwrap();
        assert!(labeled.labeled);

        let unlabeled = Dataset::load_features_csv(file.path(), "has_AFIB").unwrap();
        assert!(!unlabeled.labeled);
        assert_eq!(unlabeled.len(), 1);
        assert!((unlabeled.rows[0].hrv_sdnn - 50.0).abs() < 1e-12);

        // Features are still required
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "hrv_sdnn,signal_quality").unwrap();
        writeln!(file, "50.0,0.9").unwrap();
        assert!(Dataset::load_features_csv(file.path(), "has_AFIB").is_err());
    }

    #[test]
    fn test_synthetic_dataset() {
        let dataset = Dataset::synthetic(20, 80, 42);
        let dist = dataset.label_distribution();

        assert_eq!(dataset.len(), 100);
        assert_eq!(dist[&Label::Afib], 20);
        assert_eq!(dist[&Label::Normal], 80);

        let again = Dataset::synthetic(20, 80, 42);
        assert_eq!(dataset.rows, again.rows);
    }

    #[test]
    fn test_feature_column_names_match_serde() {
        for column in FeatureColumn::ALL {
            let json = serde_json::to_string(&column).unwrap();
            assert_eq!(json, format!("\"{}\"", column.name()));
        }
    }
}
