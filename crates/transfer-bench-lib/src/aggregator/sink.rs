// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{RunParameters, RunSummary};
use crate::{
    error::PersistenceError,
    types::{ConcurrencyMode, IsolationLevel, TransactionResult},
};
use serde::Serialize;
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

const DETAIL_HEADER: [&str; 11] = [
    "run_id",
    "start_ts",
    "end_ts",
    "mode",
    "isolation",
    "from_id",
    "to_id",
    "amount",
    "status",
    "latency_s",
    "error",
];

const SUMMARY_HEADER: [&str; 12] = [
    "run_id",
    "mode",
    "isolation",
    "concurrency",
    "total_ops",
    "completed",
    "aborted",
    "abort_rate_pct",
    "avg_latency_s",
    "p50_latency_s",
    "throughput_ops_per_s",
    "timestamp",
];

/// One row of the detail store. Field order must match `DETAIL_HEADER`.
#[derive(Debug, Serialize)]
pub struct DetailRow {
    pub run_id: u64,
    pub start_ts: String,
    pub end_ts: String,
    pub mode: ConcurrencyMode,
    pub isolation: IsolationLevel,
    pub from_id: i32,
    pub to_id: i32,
    pub amount: f64,
    pub status: String,
    pub latency_s: f64,
    pub error: Option<String>,
}

impl DetailRow {
    pub fn new(run_id: u64, result: &TransactionResult) -> Self {
        Self {
            run_id,
            start_ts: result.started_at.to_rfc3339(),
            end_ts: result.finished_at.to_rfc3339(),
            mode: result.request.mode,
            isolation: result.request.isolation,
            from_id: result.request.from_account.0,
            to_id: result.request.to_account.0,
            amount: result.request.amount,
            status: flatten(&result.outcome.to_string()),
            latency_s: result.latency.as_secs_f64(),
            error: result.error().map(flatten),
        }
    }
}

/// Keeps multi-line server messages on a single CSV line.
fn flatten(text: &str) -> String {
    text.replace('\n', " | ")
}

/// Append-only CSV stores for per-transaction details and per-run summaries.
///
/// The header row is written only when a file is empty, so consecutive runs
/// (and consecutive experiments) accumulate in the same files.
#[derive(Clone, Debug)]
pub struct CsvSink {
    detail_path: PathBuf,
    summary_path: PathBuf,
}

impl CsvSink {
    pub fn new(detail_path: impl Into<PathBuf>, summary_path: impl Into<PathBuf>) -> Self {
        Self {
            detail_path: detail_path.into(),
            summary_path: summary_path.into(),
        }
    }

    pub fn append_details(
        &self,
        params: &RunParameters,
        results: &[TransactionResult],
    ) -> Result<(), PersistenceError> {
        let mut writer = open_append(&self.detail_path, &DETAIL_HEADER)?;
        for result in results {
            let row = DetailRow::new(params.run_id, result);
            writer
                .serialize(row)
                .map_err(|e| csv_error(&self.detail_path, e))?;
        }
        writer
            .flush()
            .map_err(|e| PersistenceError::IO(display(&self.detail_path), e))
    }

    pub fn append_summary(&self, summary: &RunSummary) -> Result<(), PersistenceError> {
        let mut writer = open_append(&self.summary_path, &SUMMARY_HEADER)?;
        writer
            .serialize(summary)
            .map_err(|e| csv_error(&self.summary_path, e))?;
        writer
            .flush()
            .map_err(|e| PersistenceError::IO(display(&self.summary_path), e))
    }
}

/// Opens `path` for appending, emitting `header` first if the file is empty.
fn open_append(path: &Path, header: &[&str]) -> Result<csv::Writer<File>, PersistenceError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| PersistenceError::IO(display(path), e))?;
    let is_empty = file
        .metadata()
        .map_err(|e| PersistenceError::IO(display(path), e))?
        .len()
        == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if is_empty {
        writer
            .write_record(header)
            .map_err(|e| csv_error(path, e))?;
    }
    Ok(writer)
}

fn csv_error(path: &Path, error: csv::Error) -> PersistenceError {
    PersistenceError::Csv(display(path), error)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
