// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone classifier comparison
//!
//! Prepares the data once and evaluates every in-repo classifier with its
//! default hyperparameters, without search or report rendering.

use afib_eval::config::{ExperimentConfig, Variant};
use afib_eval::datasets::{Dataset, Label};
use afib_eval::models::ModelKind;
use afib_eval::pipeline::ExperimentPipeline;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "run-baseline")]
#[command(about = "Compare in-repo classifiers on prepared HRV data")]
#[command(version)]
struct Args {
    /// Experiment variant (cnn-lstm, gradient-boost, resnet)
    #[arg(short, long, default_value = "cnn-lstm")]
    variant: Variant,

    /// Input CSV; a synthetic dataset is used when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Run only this classifier
    #[arg(short, long)]
    model: Option<ModelKind>,

    /// Random seed
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// List available classifiers
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list {
        println!("Available classifiers:");
        println!("----------------------");
        for kind in ModelKind::ALL {
            println!("  {}: {}", kind, kind.description());
        }
        return Ok(());
    }

    let config = ExperimentConfig {
        seed: args.seed,
        ..ExperimentConfig::for_variant(args.variant)
    };

    let dataset = match &args.input {
        Some(path) => Dataset::load_csv(path, &config.label_column)?,
        None => {
            tracing::warn!("No input provided, using synthetic dataset (seed={})", args.seed);
            Dataset::synthetic(20, 80, args.seed)
        }
    };

    println!("\nDataset: {} rows", dataset.len());
    for label in Label::ALL {
        let count = dataset.label_distribution().get(&label).copied().unwrap_or(0);
        println!(
            "  {}: {} ({:.1}%)",
            label,
            count,
            count as f64 / dataset.len().max(1) as f64 * 100.0
        );
    }

    let pipeline = ExperimentPipeline::new(config);
    let prepared = pipeline.prepare(&dataset)?;
    println!(
        "Prepared: {} filtered, {} resampled, {} train / {} test",
        prepared.counts.filtered, prepared.counts.resampled, prepared.counts.train, prepared.counts.test
    );

    println!("\n{}", "=".repeat(70));
    println!("CLASSIFIER COMPARISON");
    println!("{}", "=".repeat(70));

    for kind in ModelKind::ALL {
        if args.model.is_some_and(|m| m != kind) {
            continue;
        }

        println!("\n## {} ##", kind);
        println!("{}", kind.description());
        println!("{}", "-".repeat(50));

        let runner = ExperimentPipeline::new(ExperimentConfig {
            model: kind,
            ..pipeline.config().clone()
        });
        let (_, evaluation) = runner.fit_and_evaluate(&prepared.split, &kind.default_params())?;

        println!("{}", evaluation.format());
    }

    println!("\n{}", "=".repeat(70));
    println!("Evaluation complete!");

    Ok(())
}
