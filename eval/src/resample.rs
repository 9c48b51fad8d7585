// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Synthetic minority oversampling (SMOTE)
//!
//! New minority samples are drawn on the segment between a random minority
//! sample and one of its k nearest minority-class neighbours.

use crate::datasets::Label;
use crate::error::{PipelineError, Result};
use crate::preprocess::NormalizedDataset;
use ndarray::{Array2, ArrayView1, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Class-balanced feature matrix
#[derive(Debug, Clone)]
pub struct ResampledDataset {
    pub features: Array2<f64>,
    pub labels: Vec<Label>,
    /// Rows `0..original_len` are the input rows, the rest are synthetic
    pub original_len: usize,
}

impl ResampledDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0; 2];
        for label in &self.labels {
            counts[label.index()] += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Smote {
    pub k_neighbors: usize,
    /// Minority count after resampling as a fraction of the majority count
    pub sampling_ratio: f64,
    pub seed: u64,
}

impl Default for Smote {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            sampling_ratio: 1.0,
            seed: 42,
        }
    }
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Self {
            k_neighbors,
            seed,
            ..Default::default()
        }
    }

    pub fn fit_resample(&self, data: &NormalizedDataset) -> Result<ResampledDataset> {
        if self.k_neighbors == 0 {
            return Err(PipelineError::InvalidConfig("k_neighbors must be at least 1".to_string()));
        }
        if !(self.sampling_ratio > 0.0 && self.sampling_ratio <= 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "sampling_ratio must be in (0, 1], got {}",
                self.sampling_ratio
            )));
        }

        let mut counts = [0usize; 2];
        for label in &data.labels {
            counts[label.index()] += 1;
        }
        let (minority, majority) = if counts[1] <= counts[0] {
            (Label::Afib, Label::Normal)
        } else {
            (Label::Normal, Label::Afib)
        };
        let n_minority = counts[minority.index()];
        let n_majority = counts[majority.index()];

        if n_minority <= self.k_neighbors {
            return Err(PipelineError::InsufficientSamples(format!(
                "minority class {} has {} samples, need more than k_neighbors={}",
                minority, n_minority, self.k_neighbors
            )));
        }

        let target = ((n_majority as f64) * self.sampling_ratio).round() as usize;
        let n_synthetic = target.saturating_sub(n_minority);

        let original_len = data.labels.len();
        if n_synthetic == 0 {
            tracing::info!("Classes already at target ratio, no synthetic samples generated");
            return Ok(ResampledDataset {
                features: data.features.clone(),
                labels: data.labels.clone(),
                original_len,
            });
        }

        let minority_rows: Vec<usize> = data
            .labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == minority)
            .map(|(i, _)| i)
            .collect();
        let neighbors = self.nearest_neighbors(&data.features, &minority_rows);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let n_features = data.features.ncols();
        let mut synthetic = Array2::<f64>::zeros((n_synthetic, n_features));

        for mut out in synthetic.axis_iter_mut(Axis(0)) {
            let pick = rng.gen_range(0..minority_rows.len());
            let nn = neighbors[pick][rng.gen_range(0..self.k_neighbors)];
            let gap: f64 = rng.gen();

            let base = data.features.row(minority_rows[pick]);
            let other = data.features.row(nn);
            out.assign(&(&base + &((&other - &base) * gap)));
        }

        let features = ndarray::concatenate(Axis(0), &[data.features.view(), synthetic.view()])
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        let mut labels = data.labels.clone();
        labels.extend(std::iter::repeat(minority).take(n_synthetic));

        tracing::info!(
            "SMOTE generated {} synthetic samples for class {} ({} -> {} rows)",
            n_synthetic,
            minority,
            original_len,
            labels.len()
        );

        Ok(ResampledDataset {
            features,
            labels,
            original_len,
        })
    }

    /// For each minority row, the dataset indices of its k nearest minority
    /// neighbours, closest first, ties by row order
    fn nearest_neighbors(&self, features: &Array2<f64>, rows: &[usize]) -> Vec<Vec<usize>> {
        rows.iter()
            .map(|&i| {
                let origin = features.row(i);
                let mut dists: Vec<(f64, usize)> = rows
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| (squared_distance(origin, features.row(j)), j))
                    .collect();
                dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                dists.into_iter().take(self.k_neighbors).map(|(_, j)| j).collect()
            })
            .collect()
    }
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::{Dataset, FeatureColumn};
    use crate::preprocess::fit_normalize;

    fn normalized(n_pos: usize, n_neg: usize) -> NormalizedDataset {
        fit_normalize(&Dataset::synthetic(n_pos, n_neg, 42), &FeatureColumn::ALL).unwrap()
    }

    #[test]
    fn test_balances_classes_exactly() {
        let data = normalized(20, 80);
        let resampled = Smote::default().fit_resample(&data).unwrap();

        assert_eq!(resampled.len(), 160);
        assert_eq!(resampled.class_counts(), [80, 80]);
        assert_eq!(resampled.original_len, 100);
        // Original rows keep their position
        assert_eq!(resampled.features.row(17), data.features.row(17));
        assert_eq!(&resampled.labels[..100], &data.labels[..]);
    }

    #[test]
    fn test_minority_can_be_class_zero() {
        let data = normalized(70, 30);
        let resampled = Smote::default().fit_resample(&data).unwrap();

        assert_eq!(resampled.class_counts(), [70, 70]);
        assert!(resampled.labels[100..].iter().all(|l| *l == Label::Normal));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let data = normalized(20, 80);
        let a = Smote::new(5, 7).fit_resample(&data).unwrap();
        let b = Smote::new(5, 7).fit_resample(&data).unwrap();
        let c = Smote::new(5, 8).fit_resample(&data).unwrap();

        assert_eq!(a.features, b.features);
        assert_ne!(a.features, c.features);
    }

    #[test]
    fn test_synthetic_samples_lie_inside_minority_hull() {
        let data = normalized(20, 80);
        let resampled = Smote::default().fit_resample(&data).unwrap();

        let minority: Vec<usize> = (0..100).filter(|&i| data.labels[i] == Label::Afib).collect();
        for j in 0..data.features.ncols() {
            let lo = minority.iter().map(|&i| data.features[[i, j]]).fold(f64::INFINITY, f64::min);
            let hi = minority.iter().map(|&i| data.features[[i, j]]).fold(f64::NEG_INFINITY, f64::max);
            for i in 100..resampled.len() {
                let v = resampled.features[[i, j]];
                assert!(v >= lo - 1e-12 && v <= hi + 1e-12);
            }
        }
    }

    #[test]
    fn test_partial_ratio() {
        let data = normalized(20, 80);
        let smote = Smote {
            sampling_ratio: 0.5,
            ..Default::default()
        };
        let resampled = smote.fit_resample(&data).unwrap();

        assert_eq!(resampled.class_counts(), [80, 40]);
    }

    #[test]
    fn test_already_balanced_is_unchanged() {
        let data = normalized(50, 50);
        let resampled = Smote::default().fit_resample(&data).unwrap();

        assert_eq!(resampled.len(), 100);
        assert_eq!(resampled.features, data.features);
    }

    #[test]
    fn test_insufficient_minority() {
        let data = normalized(5, 95);
        let err = Smote::default().fit_resample(&data).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientSamples(_)));

        let single_class = normalized(0, 40);
        let err = Smote::default().fit_resample(&single_class).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientSamples(_)));
    }

    #[test]
    fn test_nearest_neighbors_excludes_self() {
        let features = ndarray::array![[0.0], [1.0], [3.0], [10.0]];
        let smote = Smote::new(2, 0);
        let neighbors = smote.nearest_neighbors(&features, &[0, 1, 2, 3]);

        assert_eq!(neighbors[0], vec![1, 2]);
        assert_eq!(neighbors[1], vec![0, 2]);
        assert_eq!(neighbors[3], vec![2, 1]);
    }
}
