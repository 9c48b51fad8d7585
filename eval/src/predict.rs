// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Apply a saved model artifact to a feature table
//!
//! Usage:
//!   afib-predict --artifact models/ResNet_optm_model.json --input new_data.csv > predictions.csv

use afib_eval::artifact::ModelArtifact;
use afib_eval::datasets::Dataset;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "afib-predict")]
#[command(about = "Score HRV feature rows with a saved AFib model")]
#[command(version)]
struct Args {
    /// Model artifact written by afib-eval
    #[arg(short, long)]
    artifact: PathBuf,

    /// Input CSV with the feature columns the model was trained on; the
    /// label column is optional
    #[arg(short, long)]
    input: PathBuf,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid CSV
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let artifact = ModelArtifact::load(&args.artifact)
        .with_context(|| format!("loading artifact {}", args.artifact.display()))?;
    tracing::info!(
        "Loaded {} model for {} (trained {})",
        artifact.kind,
        artifact.variant,
        artifact.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let dataset = Dataset::load_features_csv(&args.input, &artifact.label_column)?;
    let predictions = artifact.predict(&dataset)?;

    let mut writer = csv::Writer::from_writer(std::io::stdout());
    writer.write_record(["row", "predicted", "probability", "actual"])?;
    for p in &predictions {
        writer.write_record([
            p.row.to_string(),
            p.predicted.to_string(),
            format!("{:.6}", p.probability),
            p.actual.map(|l| l.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;

    tracing::info!("Scored {} of {} rows", predictions.len(), dataset.len());
    Ok(())
}
