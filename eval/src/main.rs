// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! AFib experiment CLI
//!
//! Usage:
//!   afib-eval --variant resnet --input data/afdb_data.csv
//!   afib-eval --variant cnn-lstm --synthetic --model knn --trials 20

use afib_eval::config::{ExperimentConfig, Variant};
use afib_eval::datasets::Dataset;
use afib_eval::models::ModelKind;
use afib_eval::pipeline::ExperimentPipeline;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "afib-eval")]
#[command(about = "Prepare HRV features, train, and write an evaluation report")]
#[command(version)]
struct Args {
    /// Experiment variant: cnn-lstm, gradient-boost or resnet
    #[arg(short, long)]
    variant: Variant,

    /// Input CSV with HRV features
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON config file; command-line flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Classifier to train (majority, logistic, knn)
    #[arg(short, long)]
    model: Option<ModelKind>,

    /// Number of hyperparameter search trials
    #[arg(short, long)]
    trials: Option<usize>,

    /// Random seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory for the PDF report
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Directory for the model artifact
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Skip saving the model artifact
    #[arg(long)]
    no_save_model: bool,

    /// Use a generated 20/80 dataset instead of the input file
    #[arg(long)]
    synthetic: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let variant = args.variant;

    let mut config = match &args.config {
        Some(path) => {
            let mut config = ExperimentConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?;
            if config.variant != variant {
                tracing::warn!(
                    "Config variant {} overridden by --variant {}",
                    config.variant,
                    variant
                );
                config.variant = variant;
            }
            config
        }
        None => ExperimentConfig::for_variant(variant),
    };

    if let Some(input) = args.input {
        config.input = input;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(trials) = args.trials {
        config.n_trials = trials;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(dir) = args.output_dir {
        config.report_dir = dir;
    }
    if let Some(dir) = args.model_dir {
        config.model_dir = Some(dir);
    }
    if args.no_save_model {
        config.model_dir = None;
    }

    tracing::info!("AFib Evaluation Pipeline");
    tracing::info!("========================");
    tracing::info!("Variant: {}", config.variant);
    tracing::info!("Model: {}", config.model);
    tracing::info!("Seed: {}", config.seed);

    let pipeline = ExperimentPipeline::new(config);
    let results = if args.synthetic {
        let dataset = Dataset::synthetic(20, 80, pipeline.config().seed);
        pipeline.run_on(&dataset)?
    } else {
        pipeline.run()?
    };

    println!("\n{}", "=".repeat(70));
    println!("EVALUATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("{}", results.summary());
    println!("{:-<70}", "");
    println!("Report saved to: {}", results.report_path.display());
    if let Some(path) = &results.artifact_path {
        println!("Model saved to: {}", path.display());
    }

    Ok(())
}
