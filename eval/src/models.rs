// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Classifier boundary and in-repo classifiers
//!
//! Implements:
//! - Majority class baseline (always predict the most common training class)
//! - Logistic regression trained by batch gradient descent
//! - k-nearest neighbours with uniform or distance weighting
//!
//! External learners plug in by implementing [`Classifier`].

use crate::datasets::Label;
use crate::error::{PipelineError, Result};
use crate::search::{Hyperparameters, Trial};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trained-model contract shared by every learner
pub trait Classifier {
    /// Fit on a feature matrix and its labels
    fn fit(&mut self, x: ArrayView2<f64>, y: &[Label]) -> Result<()>;

    /// Per-row class probabilities `[P(0), P(1)]`
    fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<[f64; 2]>;

    /// Per-row predicted labels, argmax of `predict_proba` with ties to class 0
    fn predict(&self, x: ArrayView2<f64>) -> Vec<Label> {
        self.predict_proba(x)
            .iter()
            .map(|p| if p[1] > p[0] { Label::Afib } else { Label::Normal })
            .collect()
    }

    /// Get model name
    fn name(&self) -> &str;
}

fn check_fit_input(x: &ArrayView2<f64>, y: &[Label]) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(PipelineError::InvalidInput(format!(
            "{} feature rows but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if y.is_empty() {
        return Err(PipelineError::EmptyDataset("cannot fit on zero rows".to_string()));
    }
    Ok(())
}

/// Majority class baseline: always predicts the most common class
///
/// Ties go to class 0. The reported probability is the class prior seen
/// during training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MajorityClassifier {
    positive_rate: f64,
}

impl MajorityClassifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for MajorityClassifier {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[Label]) -> Result<()> {
        check_fit_input(&x, y)?;
        let positives = y.iter().filter(|l| **l == Label::Afib).count();
        self.positive_rate = positives as f64 / y.len() as f64;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<[f64; 2]> {
        vec![[1.0 - self.positive_rate, self.positive_rate]; x.nrows()]
    }

    fn name(&self) -> &str {
        "Majority"
    }
}

/// Binary logistic regression with L2 penalty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
    weights: Array1<f64>,
    bias: f64,
}

impl LogisticRegression {
    pub fn new(learning_rate: f64, epochs: usize, l2: f64) -> Self {
        Self {
            learning_rate,
            epochs,
            l2,
            weights: Array1::zeros(0),
            bias: 0.0,
        }
    }

    pub fn weights(&self) -> ArrayView1<f64> {
        self.weights.view()
    }

    fn decision(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.weights) + self.bias
    }
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new(0.1, 300, 0.0)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[Label]) -> Result<()> {
        check_fit_input(&x, y)?;
        let n = x.nrows() as f64;
        let target: Array1<f64> = y.iter().map(|l| l.index() as f64).collect();

        self.weights = Array1::zeros(x.ncols());
        self.bias = 0.0;

        for _ in 0..self.epochs {
            let residual = self.decision(x).mapv(sigmoid) - &target;
            let grad_w = x.t().dot(&residual) / n + &self.weights * self.l2;
            let grad_b = residual.sum() / n;

            self.weights = &self.weights - &(grad_w * self.learning_rate);
            self.bias -= grad_b * self.learning_rate;
        }

        if self.weights.iter().any(|w| !w.is_finite()) {
            return Err(PipelineError::InvalidConfig(format!(
                "logistic regression diverged with learning_rate={}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<[f64; 2]> {
        self.decision(x)
            .iter()
            .map(|&z| {
                let p = sigmoid(z);
                [1.0 - p, p]
            })
            .collect()
    }

    fn name(&self) -> &str {
        "Logistic"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    Uniform,
    Distance,
}

/// k-nearest neighbours vote over the stored training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    pub k: usize,
    pub weighting: Weighting,
    train_x: Array2<f64>,
    train_y: Vec<Label>,
}

impl KNearestNeighbors {
    pub fn new(k: usize, weighting: Weighting) -> Self {
        Self {
            k,
            weighting,
            train_x: Array2::zeros((0, 0)),
            train_y: Vec::new(),
        }
    }
}

impl Classifier for KNearestNeighbors {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[Label]) -> Result<()> {
        check_fit_input(&x, y)?;
        if self.k == 0 {
            return Err(PipelineError::InvalidConfig("k must be at least 1".to_string()));
        }
        self.train_x = x.to_owned();
        self.train_y = y.to_vec();
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<[f64; 2]> {
        let k = self.k.min(self.train_y.len());
        x.rows()
            .into_iter()
            .map(|query| {
                let mut dists: Vec<(f64, usize)> = self
                    .train_x
                    .rows()
                    .into_iter()
                    .enumerate()
                    .map(|(i, row)| {
                        let d: f64 = row.iter().zip(query.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                        (d.sqrt(), i)
                    })
                    .collect();
                dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

                let nearest = &dists[..k];
                // An exact match dominates distance weighting
                let exact: Vec<&(f64, usize)> = nearest.iter().filter(|(d, _)| *d == 0.0).collect();

                let mut votes = [0.0; 2];
                match self.weighting {
                    Weighting::Distance if !exact.is_empty() => {
                        for (_, i) in exact {
                            votes[self.train_y[*i].index()] += 1.0;
                        }
                    }
                    Weighting::Distance => {
                        for (d, i) in nearest {
                            votes[self.train_y[*i].index()] += 1.0 / d;
                        }
                    }
                    Weighting::Uniform => {
                        for (_, i) in nearest {
                            votes[self.train_y[*i].index()] += 1.0;
                        }
                    }
                }

                let total = votes[0] + votes[1];
                if total == 0.0 {
                    [0.5, 0.5]
                } else {
                    [votes[0] / total, votes[1] / total]
                }
            })
            .collect()
    }

    fn name(&self) -> &str {
        "KNN"
    }
}

/// Learner selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Majority,
    Logistic,
    Knn,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::Majority, ModelKind::Logistic, ModelKind::Knn];

    pub fn description(&self) -> &'static str {
        match self {
            ModelKind::Majority => "Always predicts the majority class from training data",
            ModelKind::Logistic => "L2-regularized logistic regression (batch gradient descent)",
            ModelKind::Knn => "k-nearest neighbours vote in standardized feature space",
        }
    }

    /// Draw a hyperparameter set from this learner's search space
    pub fn suggest(&self, trial: &mut Trial) -> Hyperparameters {
        match self {
            ModelKind::Majority => {}
            ModelKind::Logistic => {
                trial.suggest_float_log("learning_rate", 1e-3, 1.0);
                trial.suggest_int("epochs", 50, 500);
                trial.suggest_float("l2", 0.0, 0.1);
            }
            ModelKind::Knn => {
                trial.suggest_int("k", 1, 25);
                trial.suggest_categorical("weighting", &["uniform", "distance"]);
            }
        }
        trial.params().clone()
    }

    /// Hyperparameters used when no search is run
    pub fn default_params(&self) -> Hyperparameters {
        let mut params = Hyperparameters::new();
        match self {
            ModelKind::Majority => {}
            ModelKind::Logistic => {
                params.set_float("learning_rate", 0.1);
                params.set_int("epochs", 300);
                params.set_float("l2", 0.0);
            }
            ModelKind::Knn => {
                params.set_int("k", 5);
                params.set_categorical("weighting", "uniform");
            }
        }
        params
    }

    /// Construct an unfitted model from hyperparameters
    pub fn build(&self, params: &Hyperparameters) -> Result<TrainedModel> {
        Ok(match self {
            ModelKind::Majority => TrainedModel::Majority(MajorityClassifier::new()),
            ModelKind::Logistic => {
                let epochs = params.get_int("epochs")?;
                if epochs < 1 {
                    return Err(PipelineError::InvalidConfig(format!("epochs must be positive, got {}", epochs)));
                }
                TrainedModel::Logistic(LogisticRegression::new(
                    params.get_float("learning_rate")?,
                    epochs as usize,
                    params.get_float("l2")?,
                ))
            }
            ModelKind::Knn => {
                let k = params.get_int("k")?;
                if k < 1 {
                    return Err(PipelineError::InvalidConfig(format!("k must be positive, got {}", k)));
                }
                let weighting = match params.get_categorical("weighting")? {
                    "uniform" => Weighting::Uniform,
                    "distance" => Weighting::Distance,
                    other => {
                        return Err(PipelineError::InvalidConfig(format!("unknown weighting '{}'", other)))
                    }
                };
                TrainedModel::Knn(KNearestNeighbors::new(k as usize, weighting))
            }
        })
    }

    /// Build from `params` and fit in one step
    pub fn train(&self, x: ArrayView2<f64>, y: &[Label], params: &Hyperparameters) -> Result<TrainedModel> {
        let mut model = self.build(params)?;
        model.fit(x, y)?;
        Ok(model)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Majority => "majority",
            ModelKind::Logistic => "logistic",
            ModelKind::Knn => "knn",
        };
        f.write_str(name)
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "majority" => Ok(ModelKind::Majority),
            "logistic" => Ok(ModelKind::Logistic),
            "knn" => Ok(ModelKind::Knn),
            other => Err(PipelineError::InvalidConfig(format!("unknown model '{}'", other))),
        }
    }
}

/// Serializable wrapper over the in-repo classifiers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    Majority(MajorityClassifier),
    Logistic(LogisticRegression),
    Knn(KNearestNeighbors),
}

impl TrainedModel {
    /// Number of feature columns the fitted model expects, if it depends on them
    pub fn input_width(&self) -> Option<usize> {
        match self {
            TrainedModel::Majority(_) => None,
            TrainedModel::Logistic(m) => Some(m.weights.len()),
            TrainedModel::Knn(m) => Some(m.train_x.ncols()),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            TrainedModel::Majority(m) => m,
            TrainedModel::Logistic(m) => m,
            TrainedModel::Knn(m) => m,
        }
    }
}

impl Classifier for TrainedModel {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[Label]) -> Result<()> {
        match self {
            TrainedModel::Majority(m) => m.fit(x, y),
            TrainedModel::Logistic(m) => m.fit(x, y),
            TrainedModel::Knn(m) => m.fit(x, y),
        }
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Vec<[f64; 2]> {
        self.inner().predict_proba(x)
    }

    fn name(&self) -> &str {
        self.inner().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Vec<Label>) {
        let x = array![
            [-2.0, -1.5],
            [-1.5, -2.0],
            [-1.0, -1.2],
            [-1.8, -0.9],
            [1.0, 1.3],
            [1.6, 2.0],
            [2.1, 1.1],
            [1.2, 1.9]
        ];
        let y = [0, 0, 0, 0, 1, 1, 1, 1].iter().map(|&b| Label::from_index(b)).collect();
        (x, y)
    }

    #[test]
    fn test_majority_classifier() {
        let (x, _) = separable();
        let y: Vec<Label> = [0, 1, 1, 1, 1, 0, 1, 1].iter().map(|&b| Label::from_index(b)).collect();
        let mut model = MajorityClassifier::new();
        model.fit(x.view(), &y).unwrap();

        let preds = model.predict(x.view());
        assert!(preds.iter().all(|l| *l == Label::Afib));
        assert!((model.predict_proba(x.view())[0][1] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_majority_tie_goes_to_class_zero() {
        let (x, y) = separable();
        let mut model = MajorityClassifier::new();
        model.fit(x.view(), &y).unwrap();

        assert!(model.predict(x.view()).iter().all(|l| *l == Label::Normal));
    }

    #[test]
    fn test_logistic_regression_separates() {
        let (x, y) = separable();
        let mut model = LogisticRegression::new(0.5, 500, 0.0);
        model.fit(x.view(), &y).unwrap();

        assert_eq!(model.predict(x.view()), y);
        assert!(model.weights()[0] > 0.0);
    }

    #[test]
    fn test_knn_uniform_and_distance() {
        let (x, y) = separable();
        for weighting in [Weighting::Uniform, Weighting::Distance] {
            let mut model = KNearestNeighbors::new(3, weighting);
            model.fit(x.view(), &y).unwrap();
            assert_eq!(model.predict(x.view()), y);
        }

        let mut model = KNearestNeighbors::new(3, Weighting::Uniform);
        model.fit(x.view(), &y).unwrap();
        let probs = model.predict_proba(array![[1.5, 1.5]].view());
        assert!((probs[0][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_fit_length_mismatch() {
        let (x, y) = separable();
        let mut model = LogisticRegression::default();
        let err = model.fit(x.view(), &y[..3]).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[test]
    fn test_build_from_params() {
        let model = ModelKind::Knn.build(&ModelKind::Knn.default_params()).unwrap();
        assert_eq!(model.name(), "KNN");

        let mut bad = ModelKind::Knn.default_params();
        bad.set_categorical("weighting", "cosine");
        assert!(matches!(ModelKind::Knn.build(&bad), Err(PipelineError::InvalidConfig(_))));

        let missing = Hyperparameters::new();
        assert!(ModelKind::Logistic.build(&missing).is_err());
    }

    #[test]
    fn test_trained_model_serde() {
        let (x, y) = separable();
        let model = ModelKind::Logistic.train(x.view(), &y, &ModelKind::Logistic.default_params()).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"kind\":\"logistic\""));
        let restored: TrainedModel = serde_json::from_str(&json).unwrap();
        for (a, b) in restored.predict_proba(x.view()).iter().zip(model.predict_proba(x.view())) {
            assert!((a[1] - b[1]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_input_width() {
        let (x, y) = separable();
        for kind in [ModelKind::Logistic, ModelKind::Knn] {
            let model = kind.train(x.view(), &y, &kind.default_params()).unwrap();
            assert_eq!(model.input_width(), Some(2));
        }
        let majority = ModelKind::Majority.train(x.view(), &y, &Hyperparameters::new()).unwrap();
        assert_eq!(majority.input_width(), None);
    }

    #[test]
    fn test_model_kind_parse() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.to_string().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("xgboost".parse::<ModelKind>().is_err());
    }
}
