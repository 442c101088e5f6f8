// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    aggregator::{CsvSink, RunParameters, RunRecorder, RunSummary},
    config::ExperimentConfig,
    dispatcher::{LoadDispatcher, RequestGenerator},
    executor::TransactionExecutor,
    session::SessionFactory,
};
use std::sync::Arc;
use tracing::info;

/// Repeats the configured workload `runs` times, one run after the other.
pub struct ExperimentDriver {
    config: ExperimentConfig,
    executor: Arc<TransactionExecutor>,
    recorder: RunRecorder,
}

impl ExperimentDriver {
    pub fn new(config: ExperimentConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let executor = TransactionExecutor::new(factory, config.retry, config.statement_timeout());
        let recorder = RunRecorder::new(CsvSink::new(&config.out_detail, &config.out_summary));
        Self {
            config,
            executor: Arc::new(executor),
            recorder,
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Runs the whole experiment and returns one summary per run, in run order.
    ///
    /// Failed transfers and failed writes are reflected in the summaries and
    /// the logs; they never stop the experiment.
    pub async fn run(&self) -> Vec<RunSummary> {
        let mut summaries = Vec::with_capacity(self.config.runs as usize);
        for run_id in 1..=self.config.runs {
            summaries.push(self.run_once(run_id).await);
        }
        summaries
    }

    async fn run_once(&self, run_id: u64) -> RunSummary {
        let workload = self.config.workload.clone();
        let generator = match self.config.run_seed(run_id) {
            Some(seed) => RequestGenerator::from_seed(workload, seed),
            None => RequestGenerator::from_entropy(workload),
        };
        let params = RunParameters {
            run_id,
            mode: self.config.workload.mode,
            isolation: self.config.workload.isolation,
            concurrency: self.config.concurrency,
            total_requested: self.config.total_requests,
        };
        info!(
            "Starting run {}/{}: mode={} isolation={} concurrency={} total={}",
            run_id,
            self.config.runs,
            params.mode,
            params.isolation,
            params.concurrency,
            params.total_requested
        );

        let mut dispatcher =
            LoadDispatcher::new(self.executor.clone(), generator, self.config.concurrency);
        let report = dispatcher.run_batch(self.config.total_requests).await;
        let summary = self.recorder.record(&report, &params);
        info!("{}", summary);
        summary
    }
}
