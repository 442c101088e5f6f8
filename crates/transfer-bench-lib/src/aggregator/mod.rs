// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Reduction of a finished batch into a [`RunSummary`], and its persistence.

mod sink;

pub use sink::{CsvSink, DetailRow};

use crate::{
    dispatcher::BatchReport,
    types::{ConcurrencyMode, IsolationLevel},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::error;

/// Fixed parameters of one run, copied into its summary.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunParameters {
    pub run_id: u64,
    pub mode: ConcurrencyMode,
    pub isolation: IsolationLevel,
    pub concurrency: usize,
    pub total_requested: usize,
}

/// Per-run statistics. One row of the summary store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: u64,
    pub mode: ConcurrencyMode,
    pub isolation: IsolationLevel,
    pub concurrency: usize,
    #[serde(rename = "total_ops")]
    pub total_requested: usize,
    pub completed: usize,
    /// Aborts and connection errors.
    pub aborted: usize,
    pub abort_rate_pct: f64,
    pub avg_latency_s: f64,
    pub p50_latency_s: f64,
    pub throughput_ops_per_s: f64,
    #[serde(rename = "timestamp")]
    pub finished_at: DateTime<Utc>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: mode={} isolation={} concurrency={} total={} completed={} aborted={} ({:.2}%), avg latency {:.4}s, p50 {:.4}s, {:.4} ops/s",
            self.run_id,
            self.mode,
            self.isolation,
            self.concurrency,
            self.total_requested,
            self.completed,
            self.aborted,
            self.abort_rate_pct,
            self.avg_latency_s,
            self.p50_latency_s,
            self.throughput_ops_per_s,
        )
    }
}

/// Summarizes a batch. Pure: the same report always yields the same summary.
pub fn summarize(report: &BatchReport, params: &RunParameters) -> RunSummary {
    let completed = report
        .results
        .iter()
        .filter(|r| r.outcome.is_completed())
        .count();
    let aborted = report
        .results
        .iter()
        .filter(|r| r.outcome.is_aborted())
        .count();
    // Latency is recorded on every path, failures included.
    let mut latencies: Vec<f64> = report
        .results
        .iter()
        .map(|r| r.latency.as_secs_f64())
        .collect();

    let abort_rate_pct = if params.total_requested > 0 {
        round_to(aborted as f64 / params.total_requested as f64 * 100.0, 2)
    } else {
        0.0
    };
    let wall_clock = report.wall_clock.as_secs_f64();
    let throughput_ops_per_s = if wall_clock > 0.0 {
        round_to(params.total_requested as f64 / wall_clock, 4)
    } else {
        0.0
    };

    RunSummary {
        run_id: params.run_id,
        mode: params.mode,
        isolation: params.isolation,
        concurrency: params.concurrency,
        total_requested: params.total_requested,
        completed,
        aborted,
        abort_rate_pct,
        avg_latency_s: round_to(mean(&latencies), 4),
        p50_latency_s: round_to(median(&mut latencies), 4),
        throughput_ops_per_s,
        finished_at: report.finished_at,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Middle value, or the mean of the two middle values for an even count.
fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Summarizes runs and appends them to the detail and summary stores.
#[derive(Clone, Debug)]
pub struct RunRecorder {
    sink: CsvSink,
}

impl RunRecorder {
    pub fn new(sink: CsvSink) -> Self {
        Self { sink }
    }

    /// Summarizes `report` and persists it. Persistence failures are logged and
    /// never lose the summary, which is returned either way.
    pub fn record(&self, report: &BatchReport, params: &RunParameters) -> RunSummary {
        let summary = summarize(report, params);
        if let Err(e) = self.sink.append_details(params, &report.results) {
            error!("Failed to write detail rows for run {}: {}", params.run_id, e);
        }
        if let Err(e) = self.sink.append_summary(&summary) {
            error!("Failed to write summary row for run {}: {}", params.run_id, e);
        }
        summary
    }
}
