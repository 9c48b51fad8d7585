// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Seeded random hyperparameter search
//!
//! The objective is a closure over whatever data it needs; the search only
//! hands it a [`Trial`] to draw parameters from and keeps the best score.

use crate::error::{PipelineError, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Categorical(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{:.6}", v),
            ParamValue::Categorical(v) => f.write_str(v),
        }
    }
}

/// Named hyperparameters, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hyperparameters(BTreeMap<String, ParamValue>);

impl Hyperparameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, name: &str, value: i64) {
        self.0.insert(name.to_string(), ParamValue::Int(value));
    }

    pub fn set_float(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), ParamValue::Float(value));
    }

    pub fn set_categorical(&mut self, name: &str, value: &str) {
        self.0.insert(name.to_string(), ParamValue::Categorical(value.to_string()));
    }

    fn lookup(&self, name: &str) -> Result<&ParamValue> {
        self.0
            .get(name)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("missing hyperparameter '{}'", name)))
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.lookup(name)? {
            ParamValue::Int(v) => Ok(*v),
            other => Err(PipelineError::InvalidConfig(format!(
                "hyperparameter '{}' should be an integer, got {}",
                name, other
            ))),
        }
    }

    /// Integers are accepted and widened
    pub fn get_float(&self, name: &str) -> Result<f64> {
        match self.lookup(name)? {
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Int(v) => Ok(*v as f64),
            other => Err(PipelineError::InvalidConfig(format!(
                "hyperparameter '{}' should be a number, got {}",
                name, other
            ))),
        }
    }

    pub fn get_categorical(&self, name: &str) -> Result<&str> {
        match self.lookup(name)? {
            ParamValue::Categorical(v) => Ok(v),
            other => Err(PipelineError::InvalidConfig(format!(
                "hyperparameter '{}' should be categorical, got {}",
                name, other
            ))),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Parameter source handed to the objective for one evaluation
pub struct Trial {
    number: usize,
    rng: ChaCha8Rng,
    params: Hyperparameters,
}

impl Trial {
    fn new(number: usize, rng: ChaCha8Rng) -> Self {
        Self {
            number,
            rng,
            params: Hyperparameters::new(),
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn params(&self) -> &Hyperparameters {
        &self.params
    }

    /// Uniform integer in `[low, high]`
    pub fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> i64 {
        let value = if high <= low { low } else { self.rng.gen_range(low..=high) };
        self.params.set_int(name, value);
        value
    }

    /// Uniform float in `[low, high)`
    pub fn suggest_float(&mut self, name: &str, low: f64, high: f64) -> f64 {
        let value = if high <= low { low } else { self.rng.gen_range(low..high) };
        self.params.set_float(name, value);
        value
    }

    /// Log-uniform float in `[low, high)`, both bounds positive
    pub fn suggest_float_log(&mut self, name: &str, low: f64, high: f64) -> f64 {
        let value = if high <= low || low <= 0.0 {
            low
        } else {
            self.rng.gen_range(low.ln()..high.ln()).exp()
        };
        self.params.set_float(name, value);
        value
    }

    pub fn suggest_categorical(&mut self, name: &str, choices: &[&str]) -> String {
        let value = if choices.is_empty() {
            String::new()
        } else {
            choices[self.rng.gen_range(0..choices.len())].to_string()
        };
        self.params.set_categorical(name, &value);
        value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    pub number: usize,
    pub params: Hyperparameters,
    pub score: f64,
}

/// Best trial plus the full history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best_params: Hyperparameters,
    pub best_score: f64,
    pub best_trial: usize,
    pub trials: Vec<TrialRecord>,
}

/// Random search maximizing the objective over `n_trials` draws
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomSearch {
    pub n_trials: usize,
    pub seed: u64,
}

impl RandomSearch {
    pub fn new(n_trials: usize, seed: u64) -> Self {
        Self { n_trials, seed }
    }

    /// Run every trial; the earliest trial wins ties and NaN scores never win
    pub fn optimize<F>(&self, mut objective: F) -> Result<SearchOutcome>
    where
        F: FnMut(&mut Trial) -> Result<f64>,
    {
        if self.n_trials == 0 {
            return Err(PipelineError::InvalidConfig("n_trials must be at least 1".to_string()));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut trials: Vec<TrialRecord> = Vec::with_capacity(self.n_trials);
        let mut best: Option<usize> = None;

        for number in 0..self.n_trials {
            let mut trial = Trial::new(number, ChaCha8Rng::seed_from_u64(rng.gen()));
            let score = objective(&mut trial)?;

            tracing::debug!("Trial {} score={:.4} params={}", number, score, trial.params);

            let improved = match best {
                None => !score.is_nan(),
                Some(b) => score > trials[b].score,
            };
            if improved {
                best = Some(number);
            }

            trials.push(TrialRecord {
                number,
                params: trial.params,
                score,
            });
        }

        let best_trial = best.ok_or_else(|| {
            PipelineError::InvalidInput("objective returned NaN for every trial".to_string())
        })?;
        let record = &trials[best_trial];

        tracing::info!(
            "Best trial {} of {}: score={:.4} params={}",
            best_trial,
            self.n_trials,
            record.score,
            record.params
        );

        Ok(SearchOutcome {
            best_params: record.params.clone(),
            best_score: record.score,
            best_trial,
            trials,
        })
    }
}
