// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;
use transfer_bench_lib::{
    DbArgs, ExperimentConfig, ExperimentDriver, PgSessionFactory, RunArgs, metrics,
};

/// Concurrent bank-transfer benchmark
///
/// Fires randomized transfers at a PostgreSQL database through one of several
/// concurrency-control procedures and records per-transaction and per-run results.
#[derive(Debug, Parser)]
#[clap(name = "transfer-bench", author, version, propagate_version = true)]
struct Args {
    #[clap(flatten)]
    db_args: DbArgs,

    #[clap(flatten)]
    run_args: RunArgs,

    /// Load the whole experiment from a YAML file instead of the flags above.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Write the Prometheus text exposition here once the experiment is done.
    #[clap(long)]
    metrics_out: Option<PathBuf>,
}

impl Args {
    fn experiment_config(self) -> Result<ExperimentConfig> {
        match self.config {
            Some(path) => ExperimentConfig::load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display())),
            None => self
                .run_args
                .into_config(self.db_args.into_params())
                .context("Invalid experiment arguments"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let metrics_out = args.metrics_out.clone();
    let config = args.experiment_config()?;

    let factory = Arc::new(PgSessionFactory::new(&config.db));
    let driver = ExperimentDriver::new(config, factory);
    info!(
        "Running {} run(s) against {}:{}/{}, results in {} and {}",
        driver.config().runs,
        driver.config().db.host,
        driver.config().db.port,
        driver.config().db.dbname,
        driver.config().out_detail.display(),
        driver.config().out_summary.display(),
    );

    let summaries = driver.run().await;
    for summary in &summaries {
        println!("{}", summary);
    }

    if let Some(path) = metrics_out {
        let text = metrics::gather_text()?;
        std::fs::write(&path, text)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }
    Ok(())
}
