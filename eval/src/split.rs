// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Seeded train/test partitioning

use crate::datasets::Label;
use crate::error::{PipelineError, Result};
use crate::resample::ResampledDataset;
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Disjoint train and test subsets of a resampled dataset
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Vec<Label>,
    pub y_test: Vec<Label>,
    /// Source rows of the train side, in split order
    pub train_indices: Vec<usize>,
    /// Source rows of the test side, in split order
    pub test_indices: Vec<usize>,
}

/// Shuffle rows with `seed` and hold out `ceil(n * test_fraction)` of them
pub fn train_test_split(data: &ResampledDataset, test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n = data.len();
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InsufficientSamples(format!(
            "cannot split {} rows with test_fraction {}",
            n, test_fraction
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));

    let test_indices = order[..n_test].to_vec();
    let train_indices = order[n_test..].to_vec();

    let take = |indices: &[usize]| -> (Array2<f64>, Vec<Label>) {
        (
            data.features.select(Axis(0), indices),
            indices.iter().map(|&i| data.labels[i]).collect(),
        )
    };
    let (x_train, y_train) = take(&train_indices);
    let (x_test, y_test) = take(&test_indices);

    tracing::info!("Split {} rows into {} train / {} test", n, x_train.nrows(), x_test.nrows());

    Ok(Split {
        x_train,
        x_test,
        y_train,
        y_test,
        train_indices,
        test_indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn resampled(n: usize) -> ResampledDataset {
        ResampledDataset {
            features: Array2::from_shape_fn((n, 2), |(i, j)| (i * 10 + j) as f64),
            labels: (0..n).map(|i| Label::from_index(i % 2)).collect(),
            original_len: n,
        }
    }

    #[test]
    fn test_split_sizes() {
        let split = train_test_split(&resampled(160), 0.2, 42).unwrap();
        assert_eq!(split.x_train.nrows(), 128);
        assert_eq!(split.x_test.nrows(), 32);
        assert_eq!(split.y_train.len(), 128);
        assert_eq!(split.y_test.len(), 32);

        // sklearn rounds the test side up
        let split = train_test_split(&resampled(11), 0.2, 42).unwrap();
        assert_eq!(split.x_test.nrows(), 3);
    }

    #[test]
    fn test_split_deterministic() {
        let data = resampled(160);
        let a = train_test_split(&data, 0.2, 42).unwrap();
        let b = train_test_split(&data, 0.2, 42).unwrap();
        let c = train_test_split(&data, 0.2, 43).unwrap();

        assert_eq!(a.train_indices, b.train_indices);
        assert_eq!(a.test_indices, b.test_indices);
        assert_eq!(a.x_test, b.x_test);
        assert_ne!(a.test_indices, c.test_indices);
    }

    #[test]
    fn test_split_disjoint_and_complete() {
        let data = resampled(160);
        let split = train_test_split(&data, 0.2, 42).unwrap();

        let train: HashSet<usize> = split.train_indices.iter().copied().collect();
        let test: HashSet<usize> = split.test_indices.iter().copied().collect();
        assert!(train.is_disjoint(&test));

        let union: HashSet<usize> = train.union(&test).copied().collect();
        assert_eq!(union, (0..160).collect::<HashSet<_>>());

        // Rows travel with their labels
        for (k, &i) in split.test_indices.iter().enumerate() {
            assert_eq!(split.x_test.row(k), data.features.row(i));
            assert_eq!(split.y_test[k], data.labels[i]);
        }
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let data = resampled(10);
        assert!(matches!(train_test_split(&data, 0.0, 1), Err(PipelineError::InvalidConfig(_))));
        assert!(matches!(train_test_split(&data, 1.0, 1), Err(PipelineError::InvalidConfig(_))));
        assert!(matches!(
            train_test_split(&resampled(1), 0.2, 1),
            Err(PipelineError::InsufficientSamples(_))
        ));
    }
}
